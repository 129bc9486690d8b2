//! Verification of payment confirmations.
//!
//! The gateway itself is out of reach of this service. A client that completed a
//! payment forwards the confirmation it received, and the confirmation is trusted
//! only if its token was signed with the merchant secret over the exact amount.

use constant_time_eq::constant_time_eq;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::PaymentConfig;
use crate::error::{BookingError, BookingResult};

/// Confirmation of a completed payment as forwarded by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_id: String,
    pub amount: u32,
    pub currency: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct PaymentVerifier {
    merchant_id: String,
    merchant_secret: String,
    currency: String,
    require_confirmation: bool,
}

impl PaymentVerifier {
    pub fn from_config(config: &PaymentConfig) -> Self {
        Self {
            merchant_id: config.merchant_id.clone(),
            merchant_secret: config.merchant_secret.clone(),
            currency: config.currency.clone(),
            require_confirmation: config.require_confirmation,
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        self.require_confirmation
    }

    /// `hex(sha256(amount ‖ currency ‖ payment_id ‖ secret ‖ merchant_id))`
    pub fn sign(&self, amount: u32, currency: &str, payment_id: &str) -> String {
        hex::encode(self.digest(amount, currency, payment_id))
    }

    fn digest(&self, amount: u32, currency: &str, payment_id: &str) -> Vec<u8> {
        let token_string = format!(
            "{}{}{}{}{}",
            amount, currency, payment_id, self.merchant_secret, self.merchant_id
        );
        let mut hasher = Sha256::new();
        hasher.update(token_string.as_bytes());
        hasher.finalize().to_vec()
    }

    /// Checks a confirmation against the amount the reservation costs.
    ///
    /// Returns the payment id to record on the ticket. Without a confirmation this
    /// succeeds with `None` unless confirmations are required.
    pub fn verify(
        &self,
        confirmation: Option<&PaymentConfirmation>,
        expected_amount: u32,
    ) -> BookingResult<Option<String>> {
        let Some(confirmation) = confirmation else {
            if self.require_confirmation {
                return Err(BookingError::PaymentRejected("payment confirmation required".to_string()));
            }
            return Ok(None);
        };

        if confirmation.currency != self.currency {
            warn!(payment_id = %confirmation.payment_id, currency = %confirmation.currency, "payment in wrong currency");
            return Err(BookingError::PaymentRejected(format!(
                "expected currency {}, got {}",
                self.currency, confirmation.currency
            )));
        }
        if confirmation.amount != expected_amount {
            warn!(
                payment_id = %confirmation.payment_id,
                paid = confirmation.amount,
                expected = expected_amount,
                "payment amount mismatch"
            );
            return Err(BookingError::PaymentRejected(format!(
                "paid {} but the seats cost {}",
                confirmation.amount, expected_amount
            )));
        }

        let expected = self.digest(confirmation.amount, &confirmation.currency, &confirmation.payment_id);
        let presented = hex::decode(confirmation.token.trim()).unwrap_or_default();
        if !constant_time_eq(&expected, &presented) {
            warn!(payment_id = %confirmation.payment_id, "payment token mismatch");
            return Err(BookingError::PaymentRejected("invalid payment token".to_string()));
        }

        Ok(Some(confirmation.payment_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(require_confirmation: bool) -> PaymentVerifier {
        PaymentVerifier::from_config(&PaymentConfig {
            merchant_id: "cinema".into(),
            merchant_secret: "s3cret".into(),
            currency: "RUB".into(),
            require_confirmation,
        })
    }

    fn confirmation(v: &PaymentVerifier, amount: u32) -> PaymentConfirmation {
        PaymentConfirmation {
            payment_id: "pay-42".into(),
            amount,
            currency: "RUB".into(),
            token: v.sign(amount, "RUB", "pay-42"),
        }
    }

    #[test]
    fn token_is_sha256_hex() {
        let token = verifier(false).sign(640, "RUB", "pay-42");
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn accepts_matching_confirmation() {
        let v = verifier(true);
        let paid = confirmation(&v, 640);
        assert_eq!(v.verify(Some(&paid), 640).unwrap(), Some("pay-42".to_string()));
    }

    #[test]
    fn rejects_wrong_amount_even_with_valid_token() {
        let v = verifier(true);
        let paid = confirmation(&v, 340);
        assert!(matches!(v.verify(Some(&paid), 640), Err(BookingError::PaymentRejected(_))));
    }

    #[test]
    fn rejects_forged_token() {
        let v = verifier(true);
        let mut paid = confirmation(&v, 640);
        paid.token = "00".repeat(32);
        assert!(matches!(v.verify(Some(&paid), 640), Err(BookingError::PaymentRejected(_))));
    }

    #[test]
    fn token_comparison_ignores_hex_case_but_not_content() {
        let v = verifier(true);
        let mut paid = confirmation(&v, 640);
        paid.token = paid.token.to_uppercase();
        assert!(v.verify(Some(&paid), 640).is_ok());

        for bad in ["not hex at all", "", "abc"] {
            paid.token = bad.to_string();
            assert!(matches!(v.verify(Some(&paid), 640), Err(BookingError::PaymentRejected(_))), "token {:?}", bad);
        }
        // a prefix of the real token is not accepted
        paid.token = v.sign(640, "RUB", "pay-42")[..62].to_string();
        assert!(v.verify(Some(&paid), 640).is_err());
    }

    #[test]
    fn missing_confirmation_depends_on_config() {
        assert_eq!(verifier(false).verify(None, 640).unwrap(), None);
        assert!(verifier(true).verify(None, 640).is_err());
    }
}
