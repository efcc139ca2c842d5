use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use super::status::BookingKind;

/// Field-keyed validation failures, ordered for stable response bodies.
pub type FieldErrors = BTreeMap<String, String>;

/// Kind-specific intake payload, one variant per booking product.
/// Dynamic client maps are parsed into exactly one of these; anything
/// that fails `validate_intake` never reaches persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntakeDetails {
    Registration(RegistrationDetails),
    Consultation(ConsultationDetails),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BusinessStructure {
    SoleProprietor,
    Partnership,
    PrivateLimited,
    NonProfit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegistrationDetails {
    pub business_name: String,
    pub business_structure: BusinessStructure,
    pub city: String,
    /// 13-digit national identity number of the principal applicant.
    pub cnic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConsultationTopic {
    Corporate,
    Tax,
    Family,
    Property,
    Employment,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PreferredLanguage {
    English,
    Urdu,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConsultationDetails {
    pub topic: ConsultationTopic,
    /// Free-text summary of the matter, shown to the assigned lawyer.
    pub brief: String,
    pub preferred_language: PreferredLanguage,
}

// Loose mirrors of the typed details: every field optional so that a
// partially filled form produces field errors instead of a parse error.
#[derive(Debug, Deserialize)]
struct RawRegistration {
    business_name: Option<String>,
    business_structure: Option<String>,
    city: Option<String>,
    cnic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConsultation {
    topic: Option<String>,
    brief: Option<String>,
    preferred_language: Option<String>,
}

const BRIEF_MIN: usize = 10;
const BRIEF_MAX: usize = 2000;

/// Pure validation of the kind-specific intake fields.
///
/// Returns the typed details on success, or every detected field error
/// at once so the form can surface them in a single round trip.
pub fn validate_intake(
    kind: BookingKind,
    details: &serde_json::Value,
) -> Result<IntakeDetails, FieldErrors> {
    match kind {
        BookingKind::Registration => validate_registration(details),
        BookingKind::Consultation => validate_consultation(details),
    }
}

fn validate_registration(details: &serde_json::Value) -> Result<IntakeDetails, FieldErrors> {
    let mut errors = FieldErrors::new();
    let raw: RawRegistration = match serde_json::from_value(details.clone()) {
        Ok(raw) => raw,
        Err(_) => {
            errors.insert("details".into(), "must be an object".into());
            return Err(errors);
        }
    };

    let business_name = non_empty(&mut errors, "business_name", raw.business_name, 200);
    let city = non_empty(&mut errors, "city", raw.city, 100);

    let business_structure = match raw.business_structure.as_deref() {
        None | Some("") => {
            errors.insert("business_structure".into(), "is required".into());
            None
        }
        Some(value) => match value.parse::<BusinessStructure>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.insert(
                    "business_structure".into(),
                    "must be one of: sole_proprietor, partnership, private_limited, non_profit"
                        .into(),
                );
                None
            }
        },
    };

    let cnic = match raw.cnic {
        None => None,
        Some(value) if value.is_empty() => None,
        Some(value) => {
            if value.len() == 13 && value.chars().all(|c| c.is_ascii_digit()) {
                Some(value)
            } else {
                errors.insert("cnic".into(), "must be exactly 13 digits".into());
                None
            }
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(IntakeDetails::Registration(RegistrationDetails {
        business_name: business_name.unwrap_or_default(),
        business_structure: business_structure.unwrap_or(BusinessStructure::SoleProprietor),
        city: city.unwrap_or_default(),
        cnic,
    }))
}

fn validate_consultation(details: &serde_json::Value) -> Result<IntakeDetails, FieldErrors> {
    let mut errors = FieldErrors::new();
    let raw: RawConsultation = match serde_json::from_value(details.clone()) {
        Ok(raw) => raw,
        Err(_) => {
            errors.insert("details".into(), "must be an object".into());
            return Err(errors);
        }
    };

    let topic = match raw.topic.as_deref() {
        None | Some("") => {
            errors.insert("topic".into(), "is required".into());
            None
        }
        Some(value) => match value.parse::<ConsultationTopic>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.insert(
                    "topic".into(),
                    "must be one of: corporate, tax, family, property, employment, other".into(),
                );
                None
            }
        },
    };

    let brief = match raw.brief {
        None => {
            errors.insert("brief".into(), "is required".into());
            None
        }
        Some(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.len() < BRIEF_MIN {
                errors.insert(
                    "brief".into(),
                    format!("must be at least {} characters", BRIEF_MIN),
                );
                None
            } else if trimmed.len() > BRIEF_MAX {
                errors.insert(
                    "brief".into(),
                    format!("must be at most {} characters", BRIEF_MAX),
                );
                None
            } else {
                Some(trimmed)
            }
        }
    };

    let preferred_language = match raw.preferred_language.as_deref() {
        None | Some("") => Some(PreferredLanguage::Urdu),
        Some(value) => match value.parse::<PreferredLanguage>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.insert(
                    "preferred_language".into(),
                    "must be one of: english, urdu".into(),
                );
                None
            }
        },
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(IntakeDetails::Consultation(ConsultationDetails {
        topic: topic.unwrap_or(ConsultationTopic::Other),
        brief: brief.unwrap_or_default(),
        preferred_language: preferred_language.unwrap_or(PreferredLanguage::Urdu),
    }))
}

fn non_empty(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<String>,
    max_len: usize,
) -> Option<String> {
    match value {
        None => {
            errors.insert(field.into(), "is required".into());
            None
        }
        Some(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                errors.insert(field.into(), "is required".into());
                None
            } else if trimmed.len() > max_len {
                errors.insert(field.into(), format!("must be at most {} characters", max_len));
                None
            } else {
                Some(trimmed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_registration_parses() {
        let details = json!({
            "business_name": "Chughtai & Sons",
            "business_structure": "private_limited",
            "city": "Lahore",
            "cnic": "3520212345671"
        });
        let parsed = validate_intake(BookingKind::Registration, &details).unwrap();
        match parsed {
            IntakeDetails::Registration(reg) => {
                assert_eq!(reg.business_name, "Chughtai & Sons");
                assert_eq!(reg.business_structure, BusinessStructure::PrivateLimited);
                assert_eq!(reg.cnic.as_deref(), Some("3520212345671"));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn registration_collects_all_field_errors() {
        let details = json!({
            "business_structure": "llc",
            "cnic": "12345"
        });
        let errors = validate_intake(BookingKind::Registration, &details).unwrap_err();
        assert!(errors.contains_key("business_name"));
        assert!(errors.contains_key("business_structure"));
        assert!(errors.contains_key("city"));
        assert!(errors.contains_key("cnic"));
    }

    #[test]
    fn consultation_defaults_language() {
        let details = json!({
            "topic": "tax",
            "brief": "Need advice on filing overdue sales tax returns."
        });
        let parsed = validate_intake(BookingKind::Consultation, &details).unwrap();
        match parsed {
            IntakeDetails::Consultation(con) => {
                assert_eq!(con.preferred_language, PreferredLanguage::Urdu);
                assert_eq!(con.topic, ConsultationTopic::Tax);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn consultation_short_brief_rejected() {
        let details = json!({ "topic": "family", "brief": "help" });
        let errors = validate_intake(BookingKind::Consultation, &details).unwrap_err();
        assert_eq!(errors.get("brief").unwrap(), "must be at least 10 characters");
    }

    #[test]
    fn non_object_details_rejected() {
        let errors = validate_intake(BookingKind::Registration, &json!("oops")).unwrap_err();
        assert!(errors.contains_key("details"));
    }
}
