//! Housing records accepted by the gateway and their validation rules.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const MAX_BEDROOMS: i64 = 10;
pub const MAX_BATHROOMS: i64 = 10;
pub const MAX_STORIES: i64 = 5;
pub const MAX_PARKING: i64 = 10;

const YES_TOKENS: [&str; 3] = ["yes", "Yes", "YES"];
const NO_TOKENS: [&str; 3] = ["no", "No", "NO"];

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn parse(field: &'static str, value: &Value) -> Result<Self, ValidationError> {
        let Some(raw) = value.as_str() else {
            return Err(ValidationError::new(field, "expected a yes/no string"));
        };
        if YES_TOKENS.contains(&raw) {
            Ok(Self::Yes)
        } else if NO_TOKENS.contains(&raw) {
            Ok(Self::No)
        } else {
            Err(ValidationError::new(
                field,
                format!("`{raw}` is not one of yes, Yes, YES, no, No, NO"),
            ))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FurnishingStatus {
    Furnished,
    SemiFurnished,
    Unfurnished,
}

impl FurnishingStatus {
    pub fn parse(field: &'static str, value: &Value) -> Result<Self, ValidationError> {
        let Some(raw) = value.as_str() else {
            return Err(ValidationError::new(field, "invalid furnishing status"));
        };
        match raw.to_lowercase().as_str() {
            "furnished" => Ok(Self::Furnished),
            "semi-furnished" => Ok(Self::SemiFurnished),
            "unfurnished" => Ok(Self::Unfurnished),
            _ => Err(ValidationError::new(
                field,
                format!("`{raw}` is not one of furnished, semi-furnished, unfurnished"),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Furnished => "furnished",
            Self::SemiFurnished => "semi-furnished",
            Self::Unfurnished => "unfurnished",
        }
    }
}

/// A validated housing record. Field order is the declared wire order.
///
/// Deserializing goes through [`HousingRecord::from_json`], so every
/// constructed record is in range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct HousingRecord {
    pub mainroad: YesNo,
    pub guestroom: YesNo,
    pub basement: YesNo,
    pub hotwaterheating: YesNo,
    pub airconditioning: YesNo,
    pub prefarea: YesNo,
    pub furnishingstatus: FurnishingStatus,
    pub area: f64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub stories: i64,
    pub parking: i64,
}

impl HousingRecord {
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let Some(object) = value.as_object() else {
            return Err(ValidationError::new("body", "expected a JSON object"));
        };

        Ok(Self {
            mainroad: YesNo::parse("mainroad", field(object, "mainroad")?)?,
            guestroom: YesNo::parse("guestroom", field(object, "guestroom")?)?,
            basement: YesNo::parse("basement", field(object, "basement")?)?,
            hotwaterheating: YesNo::parse("hotwaterheating", field(object, "hotwaterheating")?)?,
            airconditioning: YesNo::parse("airconditioning", field(object, "airconditioning")?)?,
            prefarea: YesNo::parse("prefarea", field(object, "prefarea")?)?,
            furnishingstatus: FurnishingStatus::parse(
                "furnishingstatus",
                field(object, "furnishingstatus")?,
            )?,
            area: parse_area(field(object, "area")?)?,
            bedrooms: parse_count("bedrooms", field(object, "bedrooms")?, MAX_BEDROOMS)?,
            bathrooms: parse_count("bathrooms", field(object, "bathrooms")?, MAX_BATHROOMS)?,
            stories: parse_count("stories", field(object, "stories")?, MAX_STORIES)?,
            parking: parse_count("parking", field(object, "parking")?, MAX_PARKING)?,
        })
    }
}

impl TryFrom<Value> for HousingRecord {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

fn field<'a>(object: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, ValidationError> {
    object
        .get(name)
        .ok_or_else(|| ValidationError::new(name, "field required"))
}

fn parse_area(value: &Value) -> Result<f64, ValidationError> {
    let area = match value {
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
    .ok_or_else(|| ValidationError::new("area", "expected a number"))?;
    if !area.is_finite() || area <= 0.0 {
        return Err(ValidationError::new("area", "must be a positive number"));
    }
    // Sent to the model as FP32.
    if area > f64::from(f32::MAX) {
        return Err(ValidationError::new("area", "exceeds the FP32 range"));
    }
    Ok(area)
}

fn parse_count(field: &'static str, value: &Value, upper: i64) -> Result<i64, ValidationError> {
    let count = value
        .as_i64()
        .ok_or_else(|| ValidationError::new(field, "expected an integer"))?;
    if count < 0 {
        return Err(ValidationError::new(field, "must not be negative"));
    }
    if count >= upper {
        return Err(ValidationError::new(field, format!("must be less than {upper}")));
    }
    Ok(count)
}
