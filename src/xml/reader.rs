// Decoding of scan documents

use crate::scan::{CommandKind, Comparison, ScanCommand, Value};
use crate::xml::{BODY_ELEMENT, CodecError, CodecResult, MAX_DEPTH, ROOT_ELEMENT};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;

/// Element tree produced by the first decoding pass
///
/// Commands are built from a complete tree so that a document that fails
/// half way never yields a partial sequence.
#[derive(Debug, Default)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> CodecResult<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| CodecError::Malformed(format!("Element name is not UTF-8: {}", e)))?
            .to_string();

        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| {
                CodecError::Malformed(format!("Bad attribute on <{}>: {}", name, e))
            })?;
            let key = std::str::from_utf8(attribute.key.as_ref())
                .map_err(|e| CodecError::Malformed(format!("Attribute name is not UTF-8: {}", e)))?
                .to_string();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Text of a parameter, given either as child element or as attribute
    pub fn param(&self, name: &str) -> Option<&str> {
        if let Some(child) = self.child(name) {
            return Some(&child.text);
        }
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn required(&self, name: &str) -> CodecResult<&str> {
        self.param(name).ok_or_else(|| {
            CodecError::Malformed(format!("<{}> is missing <{}>", self.name, name))
        })
    }

    pub fn required_f64(&self, name: &str) -> CodecResult<f64> {
        let text = self.required(name)?;
        parse_number(&self.name, name, text)
    }

    pub fn optional_f64(&self, name: &str) -> CodecResult<Option<f64>> {
        match self.param(name) {
            Some(text) if !text.trim().is_empty() => parse_number(&self.name, name, text).map(Some),
            _ => Ok(None),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> CodecResult<bool> {
        match self.param(name).map(str::trim) {
            None | Some("") => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(CodecError::Malformed(format!(
                "<{}> has invalid boolean <{}>{}</{}>",
                self.name, name, other, name
            ))),
        }
    }
}

fn parse_number(element: &str, name: &str, text: &str) -> CodecResult<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        CodecError::Malformed(format!(
            "<{}> has invalid number <{}>{}</{}>",
            element, name, text, name
        ))
    })
}

/// Parse a complete XML document into its root element
pub(crate) fn parse_element<R: BufRead>(source: R) -> CodecResult<Element> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut open: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| match e {
            quick_xml::Error::Io(_) => CodecError::from(e),
            other => CodecError::Malformed(format!(
                "{} at byte {}",
                other,
                reader.buffer_position()
            )),
        })?;

        match event {
            Event::Start(start) => {
                check_depth(&open)?;
                open.push(Element::open(&start)?);
            }
            Event::Empty(start) => {
                check_depth(&open)?;
                let element = Element::open(&start)?;
                attach(&mut open, &mut root, element)?;
            }
            Event::End(_) => {
                let element = open.pop().ok_or_else(|| {
                    CodecError::Malformed("Closing tag without opening tag".to_string())
                })?;
                attach(&mut open, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                match open.last_mut() {
                    Some(element) => element.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(CodecError::Malformed(
                            "Text outside of the root element".to_string(),
                        ));
                    }
                }
            }
            Event::CData(data) => {
                let data = data.into_inner();
                let text = std::str::from_utf8(&data)
                    .map_err(|e| CodecError::Malformed(format!("CDATA is not UTF-8: {}", e)))?;
                match open.last_mut() {
                    Some(element) => element.text.push_str(text),
                    None => {
                        return Err(CodecError::Malformed(
                            "CDATA outside of the root element".to_string(),
                        ));
                    }
                }
            }
            Event::Eof => break,
            // Declaration, comments, processing instructions, doctype
            _ => {}
        }
        buf.clear();
    }

    if let Some(unclosed) = open.last() {
        return Err(CodecError::Malformed(format!(
            "Document ends inside <{}>",
            unclosed.name
        )));
    }
    root.ok_or_else(|| CodecError::Malformed("Document has no root element".to_string()))
}

/// The command tree is built recursively, so nesting is bounded up front
fn check_depth(open: &[Element]) -> CodecResult<()> {
    if open.len() >= MAX_DEPTH {
        return Err(CodecError::Malformed(format!(
            "Elements nested deeper than {} levels",
            MAX_DEPTH
        )));
    }
    Ok(())
}

fn attach(open: &mut [Element], root: &mut Option<Element>, element: Element) -> CodecResult<()> {
    if let Some(parent) = open.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(CodecError::Malformed(format!(
            "Second root element <{}>",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

/// Decode a scan document
///
/// Fails with [`CodecError::Malformed`] for XML that is not well formed or
/// lacks required parameters, and with [`CodecError::UnknownCommand`] for a
/// command tag this build does not know. Never returns a partial sequence.
pub fn decode<R: BufRead>(source: R) -> CodecResult<Vec<ScanCommand>> {
    let root = parse_element(source)?;
    if root.name != ROOT_ELEMENT {
        return Err(CodecError::Malformed(format!(
            "Expected <{}> root element, got <{}>",
            ROOT_ELEMENT, root.name
        )));
    }
    let commands = commands_from(&root.children)?;
    tracing::debug!(count = commands.len(), "Decoded scan document");
    Ok(commands)
}

pub fn decode_str(xml: &str) -> CodecResult<Vec<ScanCommand>> {
    decode(xml.as_bytes())
}

fn commands_from(elements: &[Element]) -> CodecResult<Vec<ScanCommand>> {
    elements.iter().map(command_from).collect()
}

fn body_of(element: &Element) -> CodecResult<Vec<ScanCommand>> {
    match element.child(BODY_ELEMENT) {
        Some(body) => commands_from(&body.children),
        None => Ok(Vec::new()),
    }
}

fn command_from(element: &Element) -> CodecResult<ScanCommand> {
    let kind = CommandKind::from_tag(&element.name)
        .ok_or_else(|| CodecError::UnknownCommand(element.name.clone()))?;

    let command = match kind {
        CommandKind::Comment => ScanCommand::Comment {
            text: element.param("text").unwrap_or_default().to_string(),
        },
        CommandKind::Move => ScanCommand::Move {
            device: element.required("device")?.to_string(),
            value: element.required_f64("value")?,
        },
        CommandKind::Set => ScanCommand::Set {
            device: element.required("device")?.to_string(),
            value: parse_value(element.required("value")?),
            wait: element.bool_or("wait", true)?,
        },
        CommandKind::Wait => ScanCommand::Wait {
            seconds: element.required_f64("seconds")?,
        },
        CommandKind::WaitFor => {
            let text = element.required("comparison")?;
            let comparison = Comparison::parse(text).ok_or_else(|| {
                CodecError::Malformed(format!("Unknown comparison '{}'", text))
            })?;
            ScanCommand::WaitFor {
                device: element.required("device")?.to_string(),
                comparison,
                desired: element.required_f64("desired")?,
                tolerance: element.optional_f64("tolerance")?.unwrap_or(0.0),
                timeout: element.optional_f64("timeout")?,
            }
        }
        CommandKind::Log => ScanCommand::Log {
            message: element.param("message").unwrap_or_default().to_string(),
            devices: element
                .child("devices")
                .map(|devices| {
                    devices
                        .children
                        .iter()
                        .filter(|child| child.name == "device")
                        .map(|child| child.text.clone())
                        .collect()
                })
                .unwrap_or_default(),
        },
        CommandKind::Loop => ScanCommand::Loop {
            device: element.required("device")?.to_string(),
            start: element.required_f64("start")?,
            end: element.required_f64("end")?,
            step: element.required_f64("step")?,
            body: body_of(element)?,
        },
        CommandKind::Sequence => ScanCommand::Sequence {
            body: body_of(element)?,
        },
        CommandKind::Parallel => ScanCommand::Parallel {
            body: body_of(element)?,
        },
        CommandKind::Include => ScanCommand::Include {
            path: element.required("path")?.to_string(),
            macros: element.param("macros").unwrap_or_default().to_string(),
        },
    };
    Ok(command)
}

/// Quoted text is a string value, anything else is tried as a number first
fn parse_value(text: &str) -> Value {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return Value::Text(text[1..text.len() - 1].to_string());
    }
    match text.trim().parse::<f64>() {
        Ok(number) => Value::Number(number),
        Err(_) => Value::Text(text.to_string()),
    }
}
