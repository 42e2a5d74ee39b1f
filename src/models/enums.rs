use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum CallStatus {
    #[sea_orm(string_value = "Uploaded")]
    Uploaded,
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Processed")]
    Processed,
    #[serde(rename = "Processing Failed")]
    #[sea_orm(string_value = "Processing Failed")]
    ProcessingFailed,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "Uploaded",
            Self::Processing => "Processing",
            Self::Processed => "Processed",
            Self::ProcessingFailed => "Processing Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::ProcessingFailed)
    }

    /// Status only moves forward: Uploaded -> Processing -> Processed | Processing Failed.
    /// Processing -> Processing is accepted so an interrupted job can resume.
    pub fn can_transition_to(self, next: CallStatus) -> bool {
        match (self, next) {
            (Self::Uploaded, Self::Processing) => true,
            (Self::Uploaded, Self::ProcessingFailed) => true,
            (Self::Processing, Self::Processing) => true,
            (Self::Processing, Self::Processed) => true,
            (Self::Processing, Self::ProcessingFailed) => true,
            _ => false,
        }
    }
}

impl Default for CallStatus {
    fn default() -> Self {
        Self::Uploaded
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "Prepaid")]
    Prepaid,
    #[sea_orm(string_value = "Collected")]
    Collected,
    #[sea_orm(string_value = "Committed")]
    Committed,
    #[sea_orm(string_value = "Pending")]
    Pending,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepaid => "Prepaid",
            Self::Collected => "Collected",
            Self::Committed => "Committed",
            Self::Pending => "Pending",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match normalize_label(label).as_str() {
            "prepaid" | "pre paid" => Some(Self::Prepaid),
            "collected" => Some(Self::Collected),
            "committed" => Some(Self::Committed),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum PaymentCurrency {
    #[serde(rename = "USD")]
    #[sea_orm(string_value = "USD")]
    Usd,
    #[serde(rename = "INR")]
    #[sea_orm(string_value = "INR")]
    Inr,
    #[serde(rename = "EUR")]
    #[sea_orm(string_value = "EUR")]
    Eur,
    #[serde(rename = "GBP")]
    #[sea_orm(string_value = "GBP")]
    Gbp,
    #[serde(rename = "JPY")]
    #[sea_orm(string_value = "JPY")]
    Jpy,
    #[serde(rename = "AUD")]
    #[sea_orm(string_value = "AUD")]
    Aud,
    #[sea_orm(string_value = "Other")]
    Other,
}

impl PaymentCurrency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Inr => "INR",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Jpy => "JPY",
            Self::Aud => "AUD",
            Self::Other => "Other",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "USD" => Some(Self::Usd),
            "INR" => Some(Self::Inr),
            "EUR" => Some(Self::Eur),
            "GBP" => Some(Self::Gbp),
            "JPY" => Some(Self::Jpy),
            "AUD" => Some(Self::Aud),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

impl Default for PaymentCurrency {
    fn default() -> Self {
        Self::Usd
    }
}

impl fmt::Display for PaymentCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum PaymentMethod {
    #[serde(rename = "Credit Card")]
    #[sea_orm(string_value = "Credit Card")]
    CreditCard,
    #[serde(rename = "Debit Card")]
    #[sea_orm(string_value = "Debit Card")]
    DebitCard,
    #[serde(rename = "ACH")]
    #[sea_orm(string_value = "ACH")]
    Ach,
    #[sea_orm(string_value = "Check")]
    Check,
    #[sea_orm(string_value = "Cash")]
    Cash,
    #[serde(rename = "Wire Transfer")]
    #[sea_orm(string_value = "Wire Transfer")]
    WireTransfer,
    #[sea_orm(string_value = "Other")]
    Other,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreditCard => "Credit Card",
            Self::DebitCard => "Debit Card",
            Self::Ach => "ACH",
            Self::Check => "Check",
            Self::Cash => "Cash",
            Self::WireTransfer => "Wire Transfer",
            Self::Other => "Other",
        }
    }

    /// Accepts the display labels in any case, plus `Other - <detail>`.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = normalize_label(label);
        match normalized.as_str() {
            "credit card" | "creditcard" => Some(Self::CreditCard),
            "debit card" | "debitcard" => Some(Self::DebitCard),
            "ach" | "ach transfer" => Some(Self::Ach),
            "check" | "cheque" => Some(Self::Check),
            "cash" => Some(Self::Cash),
            "wire transfer" | "wire" => Some(Self::WireTransfer),
            other if other == "other" || other.starts_with("other ") => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_label(label: &str) -> String {
    label
        .to_ascii_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
