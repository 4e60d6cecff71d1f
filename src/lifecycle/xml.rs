//! S3 lifecycle configuration documents.
//!
//! Only the subset of the lifecycle schema this crate reads and writes is
//! modeled: `Rule` elements with `ID`, `Status`, an optional `Filter/Prefix`
//! and an optional `Expiration/Days`. Unknown elements are skipped on read.

use std::io::{self, Write};

use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::constants::MANAGED_RULE_ID;

/// Root element of a lifecycle document
pub const ROOT_ELEMENT: &str = "LifecycleConfiguration";

/// Errors that can occur while reading or writing a lifecycle document.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("XML processing error: {0}")]
    QuickXml(#[from] quick_xml::Error),

    #[error("missing required XML element: {0}")]
    MissingElement(String),

    #[error("unexpected XML element: {0}")]
    UnexpectedElement(String),

    #[error("failed to parse value: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleStatus {
    #[default]
    Enabled,
    Disabled,
}

impl RuleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "Enabled",
            Self::Disabled => "Disabled",
        }
    }

    fn parse(text: &str) -> Result<Self, XmlError> {
        match text {
            "Enabled" => Ok(Self::Enabled),
            "Disabled" => Ok(Self::Disabled),
            other => Err(XmlError::ParseError(format!("invalid rule status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleFilter {
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiration {
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LifecycleRule {
    pub id: String,
    pub status: RuleStatus,
    pub filter: Option<RuleFilter>,
    pub expiration: Option<Expiration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LifecycleConfiguration {
    pub rules: Vec<LifecycleRule>,
}

impl LifecycleConfiguration {
    /// The single-rule document this crate manages
    pub fn expire_after_days(days: u32) -> Self {
        Self {
            rules: vec![LifecycleRule {
                id: MANAGED_RULE_ID.to_string(),
                status: RuleStatus::Enabled,
                filter: None,
                expiration: Some(Expiration { days }),
            }],
        }
    }

    /// Expiration of the first rule, 0 when there is none
    pub fn expiration_days(&self) -> u32 {
        self.rules
            .first()
            .and_then(|rule| rule.expiration.as_ref())
            .map_or(0, |expiration| expiration.days)
    }

    /// Serialize as an indented XML document
    ///
    /// # Errors
    ///
    /// Returns `XmlError` if writing fails.
    pub fn to_xml(&self) -> Result<Vec<u8>, XmlError> {
        let mut buf = Vec::with_capacity(256);
        let mut writer = Writer::new_with_indent(&mut buf, b' ', 2);

        writer
            .create_element(ROOT_ELEMENT)
            .write_inner_content(|w| {
                for rule in &self.rules {
                    write_rule(w, rule)?;
                }
                Ok(())
            })?;

        Ok(buf)
    }

    /// Parse a lifecycle document
    ///
    /// # Errors
    ///
    /// Returns `XmlError` if the document is malformed, has a different root
    /// element, or carries values that do not parse.
    pub fn from_xml(xml: &[u8]) -> Result<Self, XmlError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        // Skip the XML declaration and find the root element.
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.name();
                    let tag_name = std::str::from_utf8(name.as_ref())
                        .map_err(|e| XmlError::ParseError(e.to_string()))?;
                    if local_name(tag_name) != ROOT_ELEMENT {
                        return Err(XmlError::UnexpectedElement(tag_name.to_string()));
                    }
                    return read_configuration(&mut reader);
                }
                // <LifecycleConfiguration/>
                Event::Empty(e) => {
                    let name = e.name();
                    let tag_name = std::str::from_utf8(name.as_ref())
                        .map_err(|e| XmlError::ParseError(e.to_string()))?;
                    if local_name(tag_name) != ROOT_ELEMENT {
                        return Err(XmlError::UnexpectedElement(tag_name.to_string()));
                    }
                    return Ok(Self::default());
                }
                Event::Eof => {
                    return Err(XmlError::MissingElement(ROOT_ELEMENT.to_string()));
                }
                // Skip declaration, comments, processing instructions, whitespace.
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn write_rule<W: Write>(writer: &mut Writer<W>, rule: &LifecycleRule) -> io::Result<()> {
    writer.create_element("Rule").write_inner_content(|w| {
        write_text_element(w, "ID", &rule.id)?;
        write_text_element(w, "Status", rule.status.as_str())?;
        if let Some(ref filter) = rule.filter {
            w.create_element("Filter")
                .write_inner_content(|f| write_text_element(f, "Prefix", &filter.prefix))?;
        }
        if let Some(ref expiration) = rule.expiration {
            w.create_element("Expiration").write_inner_content(|e| {
                write_text_element(e, "Days", &expiration.days.to_string())
            })?;
        }
        Ok(())
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Element name without a namespace prefix
fn local_name(tag: &str) -> &str {
    tag.rsplit_once(':').map_or(tag, |(_, local)| local)
}

/// Name of a start or empty tag
fn tag_name(name: quick_xml::name::QName<'_>) -> Result<String, XmlError> {
    std::str::from_utf8(name.as_ref())
        .map(|tag| local_name(tag).to_string())
        .map_err(|e| XmlError::ParseError(e.to_string()))
}

/// Read the text content of the current element and consume its end tag.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&unescaped);
            }
            // &amp; &#60; and friends arrive between text events
            Event::GeneralRef(e) => match e.resolve_char_ref()? {
                Some(ch) => text.push(ch),
                None => {
                    let name = e
                        .decode()
                        .map_err(|err| XmlError::ParseError(err.to_string()))?;
                    let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                        .ok_or_else(|| XmlError::ParseError(format!("unknown entity &{name};")))?;
                    text.push_str(resolved);
                }
            },
            Event::End(_) => {
                return Ok(text);
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip over an element and all its children.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_string(),
                ));
            }
            _ => {}
        }
    }
}

fn parse_days(text: &str) -> Result<u32, XmlError> {
    text.trim()
        .parse::<u32>()
        .map_err(|e| XmlError::ParseError(format!("invalid day count '{text}': {e}")))
}

fn read_configuration(reader: &mut Reader<&[u8]>) -> Result<LifecycleConfiguration, XmlError> {
    let mut rules = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match tag_name(e.name())?.as_str() {
                "Rule" => rules.push(read_rule(reader)?),
                _ => skip_element(reader)?,
            },
            Event::Empty(e) => {
                if tag_name(e.name())? == "Rule" {
                    rules.push(LifecycleRule::default());
                }
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF in LifecycleConfiguration".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(LifecycleConfiguration { rules })
}

fn read_rule(reader: &mut Reader<&[u8]>) -> Result<LifecycleRule, XmlError> {
    let mut rule = LifecycleRule::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match tag_name(e.name())?.as_str() {
                "ID" => rule.id = read_text_content(reader)?,
                "Status" => rule.status = RuleStatus::parse(&read_text_content(reader)?)?,
                "Filter" => rule.filter = Some(read_filter(reader)?),
                "Expiration" => rule.expiration = read_expiration(reader)?,
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF in Rule".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(rule)
}

fn read_filter(reader: &mut Reader<&[u8]>) -> Result<RuleFilter, XmlError> {
    let mut filter = RuleFilter::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match tag_name(e.name())?.as_str() {
                "Prefix" => filter.prefix = read_text_content(reader)?,
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF in Filter".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(filter)
}

/// `Expiration` may carry a `Date` instead of `Days`; only `Days` is kept
fn read_expiration(reader: &mut Reader<&[u8]>) -> Result<Option<Expiration>, XmlError> {
    let mut days = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match tag_name(e.name())?.as_str() {
                "Days" => days = Some(parse_days(&read_text_content(reader)?)?),
                _ => skip_element(reader)?,
            },
            Event::End(_) => break,
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF in Expiration".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(days.map(|days| Expiration { days }))
}
