// ABOUTME: Input validation for request bodies before any database mutation
// ABOUTME: Collects every violated rule so the client sees all problems at once

use crate::error::{AppError, Result};
use crate::types::{CreateSourceRequest, SignupRequest};

const MAX_NAME_LENGTH: usize = 255;

#[derive(Default)]
struct Violations(Vec<&'static str>);

impl Violations {
    fn check(&mut self, ok: bool, message: &'static str) {
        if !ok {
            self.0.push(message);
        }
    }

    fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidInput(format!(
                "Validation failed: {}",
                self.0.join(", ")
            )))
        }
    }
}

pub fn validate_vault_name(name: &str) -> Result<()> {
    let mut violations = Violations::default();
    violations.check(!name.trim().is_empty(), "Vault name is required");
    violations.check(
        name.chars().count() <= MAX_NAME_LENGTH,
        "Vault name must be less than 255 characters",
    );
    violations.finish()
}

pub fn validate_source(request: &CreateSourceRequest) -> Result<()> {
    let mut violations = Violations::default();
    violations.check(!request.title.trim().is_empty(), "Source title is required");
    violations.check(
        request.title.chars().count() <= MAX_NAME_LENGTH,
        "Source title must be less than 255 characters",
    );
    if let Some(url) = &request.url {
        violations.check(is_absolute_url(url), "Invalid URL format");
    }
    if let Some(file_url) = &request.file_url {
        // Local uploads hand back a server-relative path
        violations.check(
            is_absolute_url(file_url) || file_url.starts_with("/api/"),
            "Invalid file URL format",
        );
    }
    if let Some(size) = request.file_size {
        violations.check(size > 0, "File size must be positive");
    }
    violations.finish()
}

pub fn validate_signup(request: &SignupRequest) -> Result<()> {
    let mut violations = Violations::default();
    violations.check(is_email(&request.email), "Invalid email address");
    violations.check(
        request.password.chars().count() >= 6,
        "Password must be at least 6 characters",
    );
    violations.check(
        request.name.trim().chars().count() >= 2,
        "Name must be at least 2 characters",
    );
    violations.finish()
}

fn is_absolute_url(value: &str) -> bool {
    url::Url::parse(value)
        .map(|url| url.has_host())
        .unwrap_or(false)
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}
