// Cardbox schema - flashcard and account tables for Diesel ORM

diesel::table! {
    users (id) {
        id -> Text,
        email -> Text,
        password_hash -> Text,
        active -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    sessions (token) {
        token -> Text,
        user_id -> Text,
        created_at -> Text,
        expires_at -> Text,
    }
}

diesel::table! {
    flashcards (id) {
        id -> Integer,
        user_id -> Text,
        front -> Text,
        back -> Text,
        source -> Text,
        generation_id -> Nullable<Integer>,
        status -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

// ============================================================================
// Generation Audit Tables
// ============================================================================

diesel::table! {
    generations (id) {
        id -> Integer,
        user_id -> Text,
        source_text_hash -> Text,
        source_text_length -> Integer,
        ai_model -> Text,
        generated_count -> Integer,
        accepted_edited_count -> Integer,
        accepted_unedited_count -> Integer,
        generation_duration_ms -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    generation_error_logs (id) {
        id -> Integer,
        user_id -> Text,
        source_text_hash -> Text,
        source_text_length -> Integer,
        ai_model -> Text,
        error_code -> Text,
        error_message -> Text,
        created_at -> Text,
    }
}
