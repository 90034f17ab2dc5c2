//! Camera web page parsing
//!
//! The camera exposes its settings as plain HTML forms (`CameraSetup`,
//! `Exposure`, `FilterNames`, `EthernetParams`) and its device properties as a
//! two-column table on the index page. Writing a setting means resubmitting
//! the complete form with some values changed, so forms are kept in document
//! order.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use stxl_core::transport::{Params, Reply, TransportError};
use url::form_urlencoded;

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*(/?)\s*([a-z]+)\b([^>]*)>").expect("Invalid tag regex")
});

static ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:-]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("Invalid attribute regex")
});

static PROPERTY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<td[^>]*class\s*=\s*"valuename"[^>]*>(.*?)</td>\s*<td[^>]*class\s*=\s*"value"[^>]*>(.*?)</td>"#,
    )
    .expect("Invalid property regex")
});

/// One HTML form: current values in document order plus radio choices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    pub name: String,
    fields: Vec<(String, String)>,
    choices: BTreeMap<String, Vec<String>>,
}

impl Form {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Allowed values of a radio group
    pub fn choices(&self, name: &str) -> Option<&[String]> {
        self.choices.get(name).map(Vec::as_slice)
    }

    fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name) || self.choices.contains_key(name)
    }

    fn set(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    /// The whole form with `updates` applied; unknown names are rejected
    pub fn merge(&self, updates: &[(String, String)]) -> Result<Params, TransportError> {
        let mut merged = self.clone();
        for (name, value) in updates {
            if !self.contains(name) {
                return Err(TransportError::RequestFailed(format!(
                    "form {} has no field {}",
                    self.name, name
                )));
            }
            merged.set(name, value);
        }
        Ok(merged.fields)
    }

    pub fn to_reply(&self) -> Reply {
        self.fields.iter().cloned().collect()
    }
}

/// Encode parameters as a query string, without the leading `?`
pub fn encode_query(params: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(n, v)| (n.as_str(), v.as_str())))
        .finish()
}

fn attributes(raw: &str) -> BTreeMap<String, String> {
    ATTR_REGEX
        .captures_iter(raw)
        .map(|c| {
            let name = c[1].to_ascii_lowercase();
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

/// Parse every named form in a page
pub fn parse_forms(html: &str) -> Result<BTreeMap<String, Form>, TransportError> {
    let mut forms = BTreeMap::new();
    let mut current: Option<Form> = None;

    for tag in TAG_REGEX.captures_iter(html) {
        let closing = !tag[1].is_empty();
        let element = tag[2].to_ascii_lowercase();

        match (element.as_str(), closing) {
            ("form", false) => {
                let attrs = attributes(&tag[3]);
                let name = attrs.get("name").cloned().unwrap_or_default();
                if forms.contains_key(&name) {
                    return Err(malformed(format!("duplicate form {:?}", name)));
                }
                if let Some(open) = current.replace(Form::new(name)) {
                    forms.insert(open.name.clone(), open);
                }
            }
            ("form", true) => {
                if let Some(done) = current.take() {
                    forms.insert(done.name.clone(), done);
                }
            }
            ("input", false) => {
                let attrs = attributes(&tag[3]);
                let form = current
                    .as_mut()
                    .ok_or_else(|| malformed(format!("input outside a form: {:?}", attrs)))?;
                add_input(form, &attrs)?;
            }
            _ => {}
        }
    }

    if let Some(open) = current.take() {
        forms.insert(open.name.clone(), open);
    }
    Ok(forms)
}

fn add_input(form: &mut Form, attrs: &BTreeMap<String, String>) -> Result<(), TransportError> {
    let kind = attrs.get("type").map(String::as_str).unwrap_or("text");
    let name = attrs.get("name").cloned().unwrap_or_default();
    let value = attrs.get("value").cloned().unwrap_or_default();

    match kind.to_ascii_lowercase().as_str() {
        "submit" | "button" => Ok(()),
        "text" | "hidden" => {
            if form.get(&name).is_some() {
                return Err(malformed(format!(
                    "duplicate input {} in form {}",
                    name, form.name
                )));
            }
            form.fields.push((name, value));
            Ok(())
        }
        "radio" => {
            form.choices
                .entry(name.clone())
                .or_default()
                .push(value.clone());
            if attrs.contains_key("checked") {
                if form.get(&name).is_some() {
                    return Err(malformed(format!(
                        "radio group {} in form {} has two checked values",
                        name, form.name
                    )));
                }
                form.fields.push((name, value));
            }
            Ok(())
        }
        other => Err(malformed(format!(
            "unsupported input type {:?} in form {}",
            other, form.name
        ))),
    }
}

/// Parse one named form from a page
pub fn parse_form(html: &str, name: &str) -> Result<Form, TransportError> {
    parse_forms(html)?
        .remove(name)
        .ok_or_else(|| malformed(format!("page has no form {:?}", name)))
}

/// Device properties from the index page's name/value table
pub fn parse_properties(html: &str) -> Reply {
    PROPERTY_REGEX
        .captures_iter(html)
        .map(|c| (c[1].trim().to_string(), c[2].trim().to_string()))
        .collect()
}

fn malformed(message: String) -> TransportError {
    TransportError::MalformedResponse(message)
}
