//! Console client - prompts an operator for each form field until the
//! instance ends

use crate::core::{format_hint, FormProperty, FormType, InstanceId, Variables};
use crate::engine::ProcessEngine;
use crate::error::EngineError;
use anyhow::Result;
use std::io::{BufRead, Write};

/// Line-oriented prompt over any reader/writer pair
pub struct Console<R, W> {
    input: R,
    output: W,
    date_format: String,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W, date_format: impl Into<String>) -> Self {
        Self {
            input,
            output,
            date_format: date_format.into(),
        }
    }

    /// Print a prompt and read one line, without its line ending
    pub fn prompt_line(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{} ", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            anyhow::bail!("Input closed while waiting for: {}", prompt);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Ask for every property of a form, re-prompting on bad input
    pub fn collect_form(&mut self, properties: &[FormProperty]) -> Result<Variables> {
        let mut variables = Variables::new();

        for property in properties {
            let prompt = match property.form_type {
                FormType::String => format!("Please enter {}?", property.label()),
                FormType::Date => format!(
                    "Please enter {}? (format {})",
                    property.label(),
                    format_hint(&self.date_format)
                ),
            };

            let value = loop {
                let line = self.prompt_line(&prompt)?;

                if line.trim().is_empty() {
                    if property.required {
                        writeln!(self.output, "{} is required", property.label())?;
                        continue;
                    }
                    if property.form_type == FormType::Date {
                        break None;
                    }
                }

                match property
                    .form_type
                    .parse_input(&property.id, &line, &self.date_format)
                {
                    Ok(value) => break Some(value),
                    Err(e @ EngineError::InvalidInputFormat { .. }) => {
                        log::warn!("{}", e);
                        writeln!(self.output, "{}", e)?;
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            log::info!(
                "Input for {} is [{}]",
                property.id,
                value.as_ref().map(ToString::to_string).unwrap_or_default()
            );
            if let Some(value) = value {
                variables.insert(property.id.clone(), value);
            }
        }

        Ok(variables)
    }
}

/// Drive an instance to its end, completing each pending task with input
/// from the console. Returns the number of tasks completed.
pub fn drive<R: BufRead, W: Write>(
    engine: &ProcessEngine,
    instance_id: &InstanceId,
    console: &mut Console<R, W>,
) -> Result<usize> {
    let mut completed = 0;

    while !engine.is_ended(instance_id)? {
        let pending = engine.list_pending(instance_id)?;
        log::info!("Pending tasks: {}", pending.len());

        if pending.is_empty() {
            anyhow::bail!("Instance {} is running but has no pending task", instance_id);
        }

        for task in pending {
            log::info!("Pending task [{}]", task.name);
            writeln!(console.output, "== {} ==", task.name)?;

            let form = engine.resolve_form(&task)?;
            let variables = console.collect_form(&form)?;
            engine.submit_form(&task.id, variables)?;
            completed += 1;
        }
    }

    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FormValue, DEFAULT_DATE_FORMAT};
    use chrono::NaiveDate;
    use std::io::Cursor;

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(
            Cursor::new(input.as_bytes().to_vec()),
            Vec::new(),
            DEFAULT_DATE_FORMAT,
        )
    }

    #[test]
    fn test_collect_string_and_date() {
        let mut c = console("Alice\n2024-05-01\n");
        let vars = c
            .collect_form(&[
                FormProperty::string("name", "Applicant"),
                FormProperty::date("submitTime", "Submit date"),
            ])
            .unwrap();

        assert_eq!(vars["name"], FormValue::from("Alice"));
        assert_eq!(
            vars["submitTime"],
            FormValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
        );
        let shown = String::from_utf8(c.output).unwrap();
        assert!(shown.contains("Please enter Submit date? (format yyyy-MM-dd)"));
    }

    #[test]
    fn test_bad_date_reprompts() {
        let mut c = console("tomorrow\n2024-05-02\n");
        let vars = c
            .collect_form(&[FormProperty::date("due", "Due")])
            .unwrap();
        assert_eq!(vars["due"].as_date(), NaiveDate::from_ymd_opt(2024, 5, 2));

        let shown = String::from_utf8(c.output).unwrap();
        assert_eq!(shown.matches("Please enter Due?").count(), 2);
    }

    #[test]
    fn test_required_blank_reprompts() {
        let mut c = console("\n  \nBob\n");
        let vars = c
            .collect_form(&[FormProperty::string("name", "Name").required()])
            .unwrap();
        assert_eq!(vars["name"], FormValue::from("Bob"));
    }

    #[test]
    fn test_optional_blank_date_skipped() {
        let mut c = console("\n");
        let vars = c.collect_form(&[FormProperty::date("due", "Due")]).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_closed_input_is_error() {
        let mut c = console("");
        assert!(c.collect_form(&[FormProperty::string("x", "X")]).is_err());
    }

    #[test]
    fn test_crlf_stripped() {
        let mut c = console("yes\r\n");
        assert_eq!(c.prompt_line(">").unwrap(), "yes");
    }
}
