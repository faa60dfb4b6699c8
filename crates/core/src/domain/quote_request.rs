use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable key for one ongoing chat session (the Telegram chat id).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ConversationId {
    fn from(chat_id: i64) -> Self {
        Self(chat_id.to_string())
    }
}

/// A mandatory field is never overloaded with a magic string: it is either
/// untouched, explicitly undeterminable, or a concrete value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FieldValue<T> {
    #[default]
    Unset,
    Missing,
    Value(T),
}

impl<T> FieldValue<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Unset | Self::Missing => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn map<U, F>(self, f: F) -> FieldValue<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Unset => FieldValue::Unset,
            Self::Missing => FieldValue::Missing,
            Self::Value(value) => FieldValue::Value(f(value)),
        }
    }

    /// `None` means the extractor could not determine the field.
    pub fn determined(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Value(value),
            None => Self::Missing,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    #[default]
    FlexTerm,
    GuaranteePlusGul,
}

impl Product {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FlexTerm => "QoL Flex Term",
            Self::GuaranteePlusGul => "QoL Guarantee Plus GUL II",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PremiumMode {
    #[default]
    Annual,
    SemiAnnual,
    Quarterly,
    Monthly,
}

impl PremiumMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Annual => "Annual",
            Self::SemiAnnual => "Semi-Annual",
            Self::Quarterly => "Quarterly",
            Self::Monthly => "Monthly",
        }
    }
}

impl fmt::Display for PremiumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub const NO_TABLE_RATING: &str = "None";

/// The five fields that must hold concrete values before a quote can run,
/// listed in the order the user is prompted for them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MandatoryField {
    Age,
    State,
    Gender,
    FaceAmount,
    Recipient,
}

impl MandatoryField {
    pub const PROMPT_ORDER: [MandatoryField; 5] =
        [Self::Age, Self::State, Self::Gender, Self::FaceAmount, Self::Recipient];

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::State => "state",
            Self::Gender => "gender",
            Self::FaceAmount => "faceAmount",
            Self::Recipient => "recipient",
        }
    }
}

impl fmt::Display for MandatoryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Per-session record accumulated across chat turns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub recipient: FieldValue<String>,
    pub state: FieldValue<String>,
    pub age: FieldValue<u32>,
    pub gender: FieldValue<Gender>,
    pub face_amount: FieldValue<u64>,
    pub product: Product,
    pub mode: PremiumMode,
    pub table_rating: String,
    pub flat_extra: Decimal,
    pub confirmed: bool,
    /// Set while a summary or a failed run is waiting on the user; an
    /// affirmative only confirms the request in this window.
    pub awaiting_confirmation: bool,
}

impl Default for QuoteRequest {
    fn default() -> Self {
        Self {
            recipient: FieldValue::Unset,
            state: FieldValue::Unset,
            age: FieldValue::Unset,
            gender: FieldValue::Unset,
            face_amount: FieldValue::Unset,
            product: Product::default(),
            mode: PremiumMode::default(),
            table_rating: NO_TABLE_RATING.to_string(),
            flat_extra: Decimal::ZERO,
            confirmed: false,
            awaiting_confirmation: false,
        }
    }
}

impl QuoteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_filled(&self, field: MandatoryField) -> bool {
        match field {
            MandatoryField::Age => self.age.value().is_some_and(|age| *age > 0),
            MandatoryField::State => {
                self.state.value().is_some_and(|state| !state.trim().is_empty())
            }
            MandatoryField::Gender => self.gender.is_value(),
            MandatoryField::FaceAmount => {
                self.face_amount.value().is_some_and(|amount| *amount > 0)
            }
            MandatoryField::Recipient => {
                self.recipient.value().is_some_and(|recipient| !recipient.trim().is_empty())
            }
        }
    }

    pub fn missing_fields(&self) -> Vec<MandatoryField> {
        MandatoryField::PROMPT_ORDER
            .into_iter()
            .filter(|field| !self.is_filled(*field))
            .collect()
    }

    pub fn first_missing_field(&self) -> Option<MandatoryField> {
        MandatoryField::PROMPT_ORDER.into_iter().find(|field| !self.is_filled(*field))
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing_field().is_none()
    }

    /// Concrete parameters for the rater, available once every mandatory
    /// field holds a value.
    pub fn to_parameters(&self) -> Option<QuoteParameters> {
        if !self.is_complete() {
            return None;
        }

        Some(QuoteParameters {
            recipient: self.recipient.value()?.trim().to_string(),
            state: self.state.value()?.trim().to_ascii_uppercase(),
            age: *self.age.value()?,
            gender: *self.gender.value()?,
            face_amount: *self.face_amount.value()?,
            product: self.product,
            mode: self.mode,
            table_rating: self.table_rating.clone(),
            flat_extra: self.flat_extra,
        })
    }
}

/// A complete request, as handed to the quote executor and delivery pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteParameters {
    pub recipient: String,
    pub state: String,
    pub age: u32,
    pub gender: Gender,
    pub face_amount: u64,
    pub product: Product,
    pub mode: PremiumMode,
    pub table_rating: String,
    pub flat_extra: Decimal,
}

impl QuoteParameters {
    pub fn has_table_rating(&self) -> bool {
        let rating = self.table_rating.trim();
        !rating.is_empty() && !rating.eq_ignore_ascii_case(NO_TABLE_RATING)
    }

    pub fn has_flat_extra(&self) -> bool {
        !self.flat_extra.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{FieldValue, Gender, MandatoryField, QuoteRequest};

    fn complete_request() -> QuoteRequest {
        QuoteRequest {
            recipient: FieldValue::Value("agent@example.com".to_string()),
            state: FieldValue::Value("oh".to_string()),
            age: FieldValue::Value(45),
            gender: FieldValue::Value(Gender::Male),
            face_amount: FieldValue::Value(500_000),
            ..QuoteRequest::default()
        }
    }

    #[test]
    fn new_request_reports_every_mandatory_field_missing_in_prompt_order() {
        let request = QuoteRequest::new();
        assert_eq!(request.missing_fields(), MandatoryField::PROMPT_ORDER.to_vec());
        assert_eq!(request.first_missing_field(), Some(MandatoryField::Age));
        assert!(!request.confirmed);
        assert_eq!(request.table_rating, "None");
    }

    #[test]
    fn field_value_defaults_to_unset() {
        assert_eq!(FieldValue::<u32>::default(), FieldValue::Unset);
        assert!(!QuoteRequest::default().awaiting_confirmation);
    }

    #[test]
    fn first_missing_field_follows_fixed_priority() {
        let mut request = complete_request();
        request.recipient = FieldValue::Missing;
        request.gender = FieldValue::Missing;
        assert_eq!(request.first_missing_field(), Some(MandatoryField::Gender));

        request.gender = FieldValue::Value(Gender::Female);
        assert_eq!(request.first_missing_field(), Some(MandatoryField::Recipient));
    }

    #[test]
    fn empty_and_zero_values_count_as_missing() {
        let mut request = complete_request();
        request.state = FieldValue::Value("  ".to_string());
        request.age = FieldValue::Value(0);
        assert_eq!(
            request.missing_fields(),
            vec![MandatoryField::Age, MandatoryField::State]
        );
    }

    #[test]
    fn parameters_are_only_available_when_complete() {
        let mut request = complete_request();
        let parameters = request.to_parameters().expect("complete request");
        assert_eq!(parameters.state, "OH");
        assert!(!parameters.has_table_rating());
        assert!(!parameters.has_flat_extra());

        request.face_amount = FieldValue::Missing;
        assert!(request.to_parameters().is_none());
    }

    #[test]
    fn table_rating_and_flat_extra_flags() {
        let mut request = complete_request();
        request.table_rating = "Table C".to_string();
        request.flat_extra = Decimal::new(250, 2);
        let parameters = request.to_parameters().expect("complete request");
        assert!(parameters.has_table_rating());
        assert!(parameters.has_flat_extra());
    }
}
