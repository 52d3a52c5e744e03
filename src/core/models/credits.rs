use serde::{Deserialize, Serialize};

/// Credit balance attached to an account snapshot. Carried through to output only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsInfo {
    /// Remaining credit balance in dollars
    #[serde(default)]
    pub remaining: f64,
    #[serde(default)]
    pub has_credits: bool,
    #[serde(default)]
    pub unlimited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl CreditsInfo {
    /// Short description for text output, e.g. "$12.50 remaining".
    pub fn describe(&self) -> String {
        if self.unlimited {
            "Unlimited".to_string()
        } else if let (Some(used), Some(limit)) = (self.used, self.limit) {
            format!("${:.2} / ${:.2} used", used, limit)
        } else if self.has_credits {
            format!("${:.2} remaining", self.remaining)
        } else {
            "No credits".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_variants() {
        let mut credits = CreditsInfo {
            remaining: 12.5,
            has_credits: true,
            unlimited: false,
            used: None,
            limit: None,
            currency: None,
        };
        assert_eq!(credits.describe(), "$12.50 remaining");
        credits.used = Some(5.0);
        credits.limit = Some(20.0);
        assert_eq!(credits.describe(), "$5.00 / $20.00 used");
        credits.unlimited = true;
        assert_eq!(credits.describe(), "Unlimited");
    }
}
