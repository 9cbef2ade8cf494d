//! Test data generation
//!
//! Random identities for scenario bodies, plus helpers for rendering values
//! into logs without leaking secrets.

use rand::seq::SliceRandom;
use rand::Rng;

const EMAIL_DOMAINS: &[&str] = &["gmail.com", "yahoo.com", "hotmail.com", "email.com", "test.com"];
const USERNAME_PREFIXES: &[&str] = &["user", "test", "demo", "sample", "auto"];
const FIRST_NAMES: &[&str] = &["John", "Jane", "Bob", "Alice", "Charlie", "Diana", "Eve", "Frank"];
const LAST_NAMES: &[&str] = &["Doe", "Smith", "Johnson", "Brown", "Davis", "Miller", "Wilson", "Moore"];
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn pick(options: &[&'static str]) -> &'static str {
    options.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
}

pub fn random_email() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    format!("user{}{}@{}", millis(), suffix, pick(EMAIL_DOMAINS))
}

pub fn random_username() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    format!("{}{}{}", pick(USERNAME_PREFIXES), millis(), suffix)
}

pub fn random_name() -> String {
    format!("{} {}", pick(FIRST_NAMES), pick(LAST_NAMES))
}

/// Phone number in `NNN-NNN-NNNN` form
pub fn random_phone() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}-{}-{}",
        rng.gen_range(100..1000),
        rng.gen_range(100..1000),
        rng.gen_range(1000..10000)
    )
}

pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())] as char)
        .collect()
}

/// Keep the first and last two characters, star out the rest.
/// Values of four characters or fewer become `****`.
pub fn mask_sensitive(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let visible = 2;
    let head: String = chars[..visible].iter().collect();
    let tail: String = chars[chars.len() - visible..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - visible * 2))
}

/// Pretty-print a JSON document, returning the input unchanged if it does
/// not parse
pub fn pretty_json(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| raw.to_string())
}
