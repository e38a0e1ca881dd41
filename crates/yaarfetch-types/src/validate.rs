//! Request validation, run by the handlers before any store access.

use thiserror::Error;

use crate::api::{
    CreateOfferRequest, CreateOrderRequest, LoginRequest, RegisterRequest, SendChatRequest,
    UpdateOfferRequest,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn required(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(ValidationError(format!("{} must not be empty", field)));
    }
    if len > max {
        return Err(ValidationError(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

fn optional(field: &str, value: Option<&str>, max: usize) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.trim().chars().count() > max => Err(ValidationError(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

fn non_negative(field: &str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ValidationError(format!(
            "{} must be a non-negative number",
            field
        ))),
        _ => Ok(()),
    }
}

/// Basic address check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 254 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }

    let local_ok = local
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));
    let domain_ok = domain
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-'));

    local_ok && domain_ok
}

/// Canonical form used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name, 100)?;
        if !is_valid_email(&normalize_email(&self.email)) {
            return Err(ValidationError("email is not a valid address".into()));
        }
        if self.password.chars().count() < 6 {
            return Err(ValidationError(
                "password must be at least 6 characters".into(),
            ));
        }
        optional("phone", self.phone.as_deref(), 20)
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_email(&normalize_email(&self.email)) {
            return Err(ValidationError("email is not a valid address".into()));
        }
        Ok(())
    }
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required("item", &self.item, 200)?;
        required("dropoff_location", &self.dropoff_location, 200)?;
        optional("instructions", self.instructions.as_deref(), 500)
    }
}

impl Validate for CreateOfferRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required("current_location", &self.current_location, 100)?;
        required("destination", &self.destination, 100)?;
        required("arrival_time", &self.arrival_time, 50)?;
        required("pickup_capability", &self.pickup_capability, 200)?;
        required("contact_number", &self.contact_number, 20)?;
        non_negative("delivery_charge", self.delivery_charge)?;
        required("estimated_delivery_time", &self.estimated_delivery_time, 50)?;
        optional("notes", self.notes.as_deref(), 500)
    }
}

impl Validate for UpdateOfferRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("current_location", self.current_location.as_deref(), 100),
            ("destination", self.destination.as_deref(), 100),
            ("arrival_time", self.arrival_time.as_deref(), 50),
            ("pickup_capability", self.pickup_capability.as_deref(), 200),
            ("contact_number", self.contact_number.as_deref(), 20),
            (
                "estimated_delivery_time",
                self.estimated_delivery_time.as_deref(),
                50,
            ),
        ];
        for (field, value, max) in fields {
            if let Some(v) = value {
                required(field, v, max)?;
            }
        }
        non_negative("delivery_charge", self.delivery_charge.flatten())?;
        optional("notes", self.notes.as_ref().and_then(|n| n.as_deref()), 500)
    }
}

impl Validate for SendChatRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        required("content", &self.content, 1000)
    }
}
