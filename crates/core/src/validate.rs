// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of StreamBridge.
//
// StreamBridge is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// StreamBridge is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with StreamBridge. If not, see <https://www.gnu.org/licenses/>.

//! Schema validation collaborator
//!
//! Validation itself is external to the core; the pipeline only needs the
//! narrow `validate(message_type, payload)` surface. Outbound validation can
//! block a publish (under `require_validation`); inbound validation is
//! warn-only and never blocks delivery.

/// Outcome of validating one payload against its message type.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    /// Whether the payload conforms to the schema.
    pub valid: bool,
    /// Validator-reported problems when `valid` is false.
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    /// A passing outcome.
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing outcome with the given problems.
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Validation collaborator consumed by the delivery pipeline.
pub trait MessageValidator: Send + Sync {
    /// Validate a payload against its message type's schema.
    fn validate(&self, message_type: &str, payload: &serde_json::Value) -> ValidationOutcome;
}

/// Validator that accepts every payload. Used when `VALIDATE_MESSAGES` is
/// off or no schema catalog is wired in.
pub struct NoopValidator;

impl MessageValidator for NoopValidator {
    fn validate(&self, _message_type: &str, _payload: &serde_json::Value) -> ValidationOutcome {
        ValidationOutcome::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_validator_accepts_everything() {
        let outcome = NoopValidator.validate("anything", &json!({"x": 1}));
        assert!(outcome.valid);
        assert!(outcome.errors.is_empty());
    }
}
