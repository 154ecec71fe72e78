// Response bodies of the scan server
//
// POST /scan/{name}          body: scan XML    -> <id>42</id>
// GET  /scan/{id}/commands                     -> scan XML
// GET  /scan/{id}                              -> <scan><id/><name/><state/>...</scan>
// Errors come back as <error><message>...</message></error>

use crate::remote::{RemoteError, RemoteResult, ScanId, ScanInfo, ScanState};
use crate::xml::reader::{Element, parse_element};

fn parse(body: &str) -> RemoteResult<Element> {
    parse_element(body.as_bytes()).map_err(|e| RemoteError::MalformedResponse(e.to_string()))
}

fn parse_id(text: &str) -> RemoteResult<ScanId> {
    text.trim()
        .parse::<u64>()
        .map(ScanId)
        .map_err(|_| RemoteError::MalformedResponse(format!("Invalid scan id '{}'", text.trim())))
}

/// Id returned by a submission
pub fn parse_submit_response(body: &str) -> RemoteResult<ScanId> {
    let root = parse(body)?;
    if root.name != "id" {
        return Err(RemoteError::MalformedResponse(format!(
            "Expected <id>, got <{}>",
            root.name
        )));
    }
    parse_id(&root.text)
}

pub fn parse_scan_info(body: &str) -> RemoteResult<ScanInfo> {
    let root = parse(body)?;
    if root.name != "scan" {
        return Err(RemoteError::MalformedResponse(format!(
            "Expected <scan>, got <{}>",
            root.name
        )));
    }
    let text = |name: &str| root.param(name).map(str::trim);

    let id = parse_id(text("id").unwrap_or_default())?;
    let state_text = text("state").unwrap_or_default();
    let state = ScanState::parse(state_text).ok_or_else(|| {
        RemoteError::MalformedResponse(format!("Unknown scan state '{}'", state_text))
    })?;
    let percentage = text("percentage")
        .and_then(|p| p.parse::<f64>().ok())
        .map(|p| p.clamp(0.0, 100.0).round() as u8);
    let error = text("error").filter(|e| !e.is_empty()).map(str::to_string);

    Ok(ScanInfo {
        id,
        name: text("name").unwrap_or_default().to_string(),
        state,
        percentage,
        error,
    })
}

pub fn format_scan_info(info: &ScanInfo) -> String {
    let mut xml = format!(
        "<scan><id>{}</id><name>{}</name><state>{}</state>",
        info.id,
        quick_xml::escape::escape(info.name.as_str()),
        info.state
    );
    if let Some(percentage) = info.percentage {
        xml.push_str(&format!("<percentage>{}</percentage>", percentage));
    }
    if let Some(error) = &info.error {
        xml.push_str(&format!("<error>{}</error>", quick_xml::escape::escape(error.as_str())));
    }
    xml.push_str("</scan>");
    xml
}

/// Human readable message of an error response, the raw body otherwise
pub fn error_message(body: &str) -> String {
    match parse(body) {
        Ok(root) if root.name == "error" => root
            .param("message")
            .map(|m| m.trim().to_string())
            .unwrap_or_else(|| root.text.trim().to_string()),
        _ => body.trim().to_string(),
    }
}
