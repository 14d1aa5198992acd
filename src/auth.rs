//! Account and session management
//!
//! Local identity lifecycle over the users/sessions tables: Argon2id password
//! hashes, UUID session tokens carried in an HttpOnly cookie. Every API
//! handler resolves the cookie to a user through [`current_user`].

use crate::db::{Database, DbError, Session, User};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use lazy_static::lazy_static;
use regex::Regex;

/// Name of the session cookie set on login
pub const SESSION_COOKIE: &str = "cardbox_session";

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Error type for authentication operations
#[derive(Debug)]
pub enum AuthError {
    /// Bad input (email format, password rules, duplicate email)
    Validation(String),
    /// Wrong email/password pair or inactive account
    InvalidCredentials,
    /// No live session
    Unauthorized,
    /// Password hashing failure
    Hash(String),
    Db(DbError),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Validation(msg) => write!(f, "{}", msg),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::Unauthorized => write!(f, "Unauthorized"),
            AuthError::Hash(msg) => write!(f, "Password hashing error: {}", msg),
            AuthError::Db(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<DbError> for AuthError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Validation(msg) => AuthError::Validation(msg),
            other => AuthError::Db(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// Validate email shape. Deliberately loose; the point is catching obvious
/// typos, not RFC 5322.
pub fn validate_email(email: &str) -> Result<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AuthError::Validation("Please enter a valid email address".to_string()))
    }
}

/// Password rules: at least 8 characters with at least one digit
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 8 || !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::Validation(
            "Password must be at least 8 characters long and contain at least one number".to_string(),
        ));
    }
    Ok(())
}

/// Hash a password with Argon2id, producing a PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC string
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Register a new account. The caller must sign in afterwards; registration
/// does not create a session.
pub fn register(db: &Database, email: &str, password: &str) -> Result<User> {
    validate_email(email)?;
    validate_password(password)?;
    let hash = hash_password(password)?;
    let user = db.create_user(email, &hash)?;
    Ok(user)
}

/// Verify credentials and open a session
pub fn login(db: &Database, email: &str, password: &str, ttl_days: i64) -> Result<(User, Session)> {
    let user = db
        .find_user_by_email(email)?
        .ok_or(AuthError::InvalidCredentials)?;

    if !user.active || !verify_password(&user.password_hash, password) {
        return Err(AuthError::InvalidCredentials);
    }

    let session = db.create_session(&user.id, ttl_days)?;
    Ok((user, session))
}

/// Close a session. Unknown tokens are a no-op.
pub fn logout(db: &Database, token: &str) -> Result<()> {
    db.delete_session(token)?;
    Ok(())
}

/// Resolve a session token to its active user
pub fn current_user(db: &Database, token: Option<&str>) -> Result<User> {
    let token = token.ok_or(AuthError::Unauthorized)?;
    let session = db.find_session(token)?.ok_or(AuthError::Unauthorized)?;
    let user = db.get_user(&session.user_id)?.ok_or(AuthError::Unauthorized)?;
    if !user.active {
        return Err(AuthError::Unauthorized);
    }
    Ok(user)
}

/// Replace the user's password after verifying the current one
pub fn change_password(db: &Database, user: &User, current: &str, new_password: &str) -> Result<()> {
    if !verify_password(&user.password_hash, current) {
        return Err(AuthError::InvalidCredentials);
    }
    validate_password(new_password)?;
    let hash = hash_password(new_password)?;
    db.update_password_hash(&user.id, &hash)?;
    Ok(())
}

/// Deactivate an account and drop all of its sessions
pub fn deactivate(db: &Database, user_id: &str) -> Result<()> {
    db.deactivate_user(user_id)?;
    Ok(())
}

/// Pull the session token out of a Cookie header value
pub fn session_token_from_cookies(cookie_header: &str) -> Option<String> {
    cookie_header.split(';').find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        if name == SESSION_COOKIE && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("missing@tld").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("two words@example.com").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("secret12").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("nodigitshere").is_err());
    }

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("correct horse 1").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse 1"));
        assert!(!verify_password(&hash, "wrong password 1"));
        assert!(!verify_password("not-a-phc-string", "anything"));
    }

    #[test]
    fn test_register_login_logout_flow() {
        let (_dir, db) = test_db();
        let user = register(&db, "flow@example.com", "password1").unwrap();

        let (logged_in, session) = login(&db, "flow@example.com", "password1", 7).unwrap();
        assert_eq!(logged_in.id, user.id);

        let resolved = current_user(&db, Some(&session.token)).unwrap();
        assert_eq!(resolved.id, user.id);

        logout(&db, &session.token).unwrap();
        assert!(matches!(
            current_user(&db, Some(&session.token)),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn test_login_rejects_wrong_password_and_unknown_email() {
        let (_dir, db) = test_db();
        register(&db, "flow@example.com", "password1").unwrap();

        assert!(matches!(
            login(&db, "flow@example.com", "wrongpass1", 7),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&db, "nobody@example.com", "password1", 7),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_deactivated_account_cannot_login_or_resolve() {
        let (_dir, db) = test_db();
        let user = register(&db, "gone@example.com", "password1").unwrap();
        let (_, session) = login(&db, "gone@example.com", "password1", 7).unwrap();

        deactivate(&db, &user.id).unwrap();

        assert!(matches!(
            login(&db, "gone@example.com", "password1", 7),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            current_user(&db, Some(&session.token)),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn test_change_password() {
        let (_dir, db) = test_db();
        let user = register(&db, "pw@example.com", "password1").unwrap();

        // Wrong current password is rejected
        assert!(matches!(
            change_password(&db, &user, "wrong1234", "newpassword2"),
            Err(AuthError::InvalidCredentials)
        ));

        change_password(&db, &user, "password1", "newpassword2").unwrap();
        assert!(login(&db, "pw@example.com", "password1", 7).is_err());
        assert!(login(&db, "pw@example.com", "newpassword2", 7).is_ok());
    }

    #[test]
    fn test_session_token_from_cookies() {
        assert_eq!(
            session_token_from_cookies("cardbox_session=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            session_token_from_cookies("theme=dark; cardbox_session=tok; other=1"),
            Some("tok".to_string())
        );
        assert_eq!(session_token_from_cookies("theme=dark"), None);
        assert_eq!(session_token_from_cookies("cardbox_session="), None);
        assert_eq!(session_token_from_cookies(""), None);
    }
}
