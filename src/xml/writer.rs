// Encoding of scan documents

use crate::scan::{ScanCommand, Value};
use crate::xml::{BODY_ELEMENT, CodecError, CodecResult, MAX_DEPTH, ROOT_ELEMENT};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;

/// Encode a scan document
///
/// Numbers use the shortest representation that parses back to the same
/// `f64`, string values of `set` are quoted so they never read back as
/// numbers. Trees nested deeper than the reader accepts fail with
/// [`CodecError::Malformed`] before anything past the limit is written.
pub fn encode<W: Write>(commands: &[ScanCommand], sink: W) -> CodecResult<()> {
    let mut writer = Writer::new_with_indent(sink, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
    write_commands(&mut writer, commands, 2)?;
    writer.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

    let mut sink = writer.into_inner();
    sink.write_all(b"\n")?;
    sink.flush()?;
    Ok(())
}

pub fn encode_string(commands: &[ScanCommand]) -> CodecResult<String> {
    let mut buf = Vec::new();
    encode(commands, &mut buf)?;
    // The writer only emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// `depth` is the element level of the command elements
fn write_commands<W: Write>(
    writer: &mut Writer<W>,
    commands: &[ScanCommand],
    depth: usize,
) -> CodecResult<()> {
    for command in commands {
        write_command(writer, command, depth)?;
    }
    Ok(())
}

fn write_param<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> CodecResult<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn write_number<W: Write>(writer: &mut Writer<W>, name: &str, value: f64) -> CodecResult<()> {
    write_param(writer, name, &value.to_string())
}

fn write_body<W: Write>(
    writer: &mut Writer<W>,
    body: &[ScanCommand],
    depth: usize,
) -> CodecResult<()> {
    if body.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(BODY_ELEMENT)))?;
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new(BODY_ELEMENT)))?;
    write_commands(writer, body, depth + 1)?;
    writer.write_event(Event::End(BytesEnd::new(BODY_ELEMENT)))?;
    Ok(())
}

fn write_command<W: Write>(
    writer: &mut Writer<W>,
    command: &ScanCommand,
    depth: usize,
) -> CodecResult<()> {
    // Every command writes at least one child element, a device list two
    let below = match command {
        ScanCommand::Log { devices, .. } if !devices.is_empty() => 2,
        _ => 1,
    };
    if depth + below > MAX_DEPTH {
        return Err(CodecError::Malformed(format!(
            "Commands nested deeper than {} levels",
            MAX_DEPTH
        )));
    }

    let tag = command.kind().tag();
    writer.write_event(Event::Start(BytesStart::new(tag)))?;

    match command {
        ScanCommand::Comment { text } => write_param(writer, "text", text)?,
        ScanCommand::Move { device, value } => {
            write_param(writer, "device", device)?;
            write_number(writer, "value", *value)?;
        }
        ScanCommand::Set {
            device,
            value,
            wait,
        } => {
            write_param(writer, "device", device)?;
            match value {
                Value::Number(number) => write_number(writer, "value", *number)?,
                Value::Text(text) => write_param(writer, "value", &format!("\"{}\"", text))?,
            }
            write_param(writer, "wait", if *wait { "true" } else { "false" })?;
        }
        ScanCommand::Wait { seconds } => write_number(writer, "seconds", *seconds)?,
        ScanCommand::WaitFor {
            device,
            comparison,
            desired,
            tolerance,
            timeout,
        } => {
            write_param(writer, "device", device)?;
            write_param(writer, "comparison", comparison.as_str())?;
            write_number(writer, "desired", *desired)?;
            write_number(writer, "tolerance", *tolerance)?;
            if let Some(timeout) = timeout {
                write_number(writer, "timeout", *timeout)?;
            }
        }
        ScanCommand::Log { message, devices } => {
            write_param(writer, "message", message)?;
            if !devices.is_empty() {
                writer.write_event(Event::Start(BytesStart::new("devices")))?;
                for device in devices {
                    write_param(writer, "device", device)?;
                }
                writer.write_event(Event::End(BytesEnd::new("devices")))?;
            }
        }
        ScanCommand::Loop {
            device,
            start,
            end,
            step,
            body,
        } => {
            write_param(writer, "device", device)?;
            write_number(writer, "start", *start)?;
            write_number(writer, "end", *end)?;
            write_number(writer, "step", *step)?;
            write_body(writer, body, depth + 1)?;
        }
        ScanCommand::Sequence { body } | ScanCommand::Parallel { body } => {
            write_body(writer, body, depth + 1)?
        }
        ScanCommand::Include { path, macros } => {
            write_param(writer, "path", path)?;
            if !macros.is_empty() {
                write_param(writer, "macros", macros)?;
            }
        }
    }

    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
