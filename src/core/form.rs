//! Form schema - typed fields of a user task and their values

use super::store::DefinitionStore;
use super::task::Task;
use super::StepKind;
use crate::error::{EngineError, EngineResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Default date pattern for form input (`yyyy-MM-dd`)
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Variables submitted with a task or held by an instance
pub type Variables = BTreeMap<String, FormValue>;

/// Field type of a form property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormType {
    String,
    Date,
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Date => write!(f, "date"),
        }
    }
}

impl FormType {
    /// Parse raw operator input into a typed value.
    ///
    /// Strings are taken verbatim. Dates are parsed with `date_format`
    /// (a chrono pattern); surrounding whitespace is ignored.
    pub fn parse_input(
        &self,
        field: &str,
        raw: &str,
        date_format: &str,
    ) -> EngineResult<FormValue> {
        match self {
            Self::String => Ok(FormValue::String(raw.to_string())),
            Self::Date => NaiveDate::parse_from_str(raw.trim(), date_format)
                .map(FormValue::Date)
                .map_err(|e| EngineError::InvalidInputFormat {
                    field: field.to_string(),
                    input: raw.to_string(),
                    reason: format!("{} (expected {})", e, format_hint(date_format)),
                }),
        }
    }

    /// Check whether a value has this type
    pub fn accepts(&self, value: &FormValue) -> bool {
        matches!(
            (self, value),
            (Self::String, FormValue::String(_)) | (Self::Date, FormValue::Date(_))
        )
    }
}

/// A typed form answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum FormValue {
    String(String),
    Date(NaiveDate),
}

impl FormValue {
    pub fn form_type(&self) -> FormType {
        match self {
            Self::String(_) => FormType::String,
            Self::Date(_) => FormType::Date,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for FormValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Date(d) => write!(f, "{}", d.format(DEFAULT_DATE_FORMAT)),
        }
    }
}

impl From<&str> for FormValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<NaiveDate> for FormValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

/// One named, typed field of a user task form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormProperty {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub form_type: FormType,
    #[serde(default)]
    pub required: bool,
}

impl FormProperty {
    pub fn new(id: impl Into<String>, name: impl Into<String>, form_type: FormType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            form_type,
            required: false,
        }
    }

    pub fn string(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, FormType::String)
    }

    pub fn date(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, FormType::Date)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Name shown to the operator; falls back to the id
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Human-readable form of a chrono date pattern, e.g. `yyyy-MM-dd`
pub fn format_hint(date_format: &str) -> String {
    date_format
        .replace("%Y", "yyyy")
        .replace("%m", "MM")
        .replace("%d", "dd")
}

/// Resolves the form schema of a pending task from its definition
pub struct FormSchemaResolver {
    definitions: Arc<DefinitionStore>,
}

impl FormSchemaResolver {
    pub fn new(definitions: Arc<DefinitionStore>) -> Self {
        Self { definitions }
    }

    /// Ordered form properties declared by the task's step
    pub fn resolve(&self, task: &Task) -> EngineResult<Vec<FormProperty>> {
        let deployed = self.definitions.get(&task.definition_id)?;
        let form = deployed
            .definition
            .steps
            .get(task.step_index)
            .map(|step| match &step.kind {
                StepKind::UserTask { form } => form.clone(),
                StepKind::End => Vec::new(),
            })
            .unwrap_or_default();
        Ok(form)
    }

    /// Check submitted variables against the task's form.
    ///
    /// Required properties must be present (and non-blank for strings),
    /// and every value for a declared property must match its type.
    /// Keys the form does not declare are passed through.
    pub fn validate(&self, task: &Task, variables: &Variables) -> EngineResult<()> {
        let invalid = |reason: String| EngineError::InvalidFormData {
            task: task.id.clone(),
            reason,
        };

        for property in self.resolve(task)? {
            match variables.get(&property.id) {
                Some(value) if !property.form_type.accepts(value) => {
                    return Err(invalid(format!(
                        "'{}' expects a {} value, got {}",
                        property.id,
                        property.form_type,
                        value.form_type()
                    )));
                }
                Some(FormValue::String(s)) if property.required && s.trim().is_empty() => {
                    return Err(invalid(format!("'{}' is required", property.id)));
                }
                None if property.required => {
                    return Err(invalid(format!("'{}' is required", property.id)));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_input_verbatim() {
        let value = FormType::String
            .parse_input("comment", " looks good ", DEFAULT_DATE_FORMAT)
            .unwrap();
        assert_eq!(value, FormValue::String(" looks good ".to_string()));
    }

    #[test]
    fn test_parse_date_input() {
        let value = FormType::Date
            .parse_input("submitTime", "2024-03-09", DEFAULT_DATE_FORMAT)
            .unwrap();
        assert_eq!(value.as_date(), NaiveDate::from_ymd_opt(2024, 3, 9));
    }

    #[test]
    fn test_parse_bad_date_is_invalid_input() {
        let err = FormType::Date
            .parse_input("submitTime", "09/03/2024", DEFAULT_DATE_FORMAT)
            .unwrap_err();
        match err {
            EngineError::InvalidInputFormat { field, input, reason } => {
                assert_eq!(field, "submitTime");
                assert_eq!(input, "09/03/2024");
                assert!(reason.contains("yyyy-MM-dd"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_accepts_matches_variant() {
        assert!(FormType::String.accepts(&"x".into()));
        assert!(!FormType::Date.accepts(&"x".into()));
    }

    #[test]
    fn test_format_hint() {
        assert_eq!(format_hint("%Y-%m-%d"), "yyyy-MM-dd");
        assert_eq!(format_hint("%d.%m.%Y"), "dd.MM.yyyy");
    }

    #[test]
    fn test_form_value_serde_tagged() {
        let value = FormValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"type":"date","value":"2024-01-02"}"#);
    }
}
