// MIT License - Copyright (c) 2026 Peter Wright
// SIA DC03 and Contact ID (DC05) event bodies

use crate::codec::PayloadEncoder;
use crate::error::{Dc09Error, Result};
use crate::message::{EventParams, MessageType};

/// Default payload encoder.
///
/// Recognized parameters:
///
/// | key            | SIA-DCS            | ADM-CID                 |
/// |----------------|--------------------|-------------------------|
/// | `account`      | overrides account  | overrides account       |
/// | `code`         | 2-letter code      | 3-digit event code      |
/// | `zone`         | appended to code   | 3-digit zone (0)        |
/// | `area`         | `ri<area>/`        | 2-digit partition (0)   |
/// | `user`         | `id<user>/`        |                         |
/// | `text`         | `^text^`           |                         |
/// | `q`            |                    | qualifier digit (1)     |
/// | `lon` / `lat`  | `[X..]` / `[Y..]`  | `[X..]` / `[Y..]`       |
/// | `verification` | `[V..]`            | `[V..]`                 |
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPayloadEncoder;

impl StandardPayloadEncoder {
    fn sia(account: &str, params: &EventParams) -> Result<String> {
        let code = params
            .get_text("code")
            .ok_or(Dc09Error::MissingField { field: "code" })?;
        let mut out = format!("[#{}|N", account);
        if let Some(area) = params.get_text("area") {
            out.push_str(&format!("ri{}/", area));
        }
        if let Some(user) = params.get_text("user") {
            out.push_str(&format!("id{}/", user));
        }
        out.push_str(&code);
        if let Some(zone) = params.get_text("zone") {
            out.push_str(&zone);
        }
        if let Some(text) = params.get_text("text") {
            out.push_str(&format!("^{}^", text));
        }
        out.push(']');
        Ok(out)
    }

    fn cid(account: &str, params: &EventParams) -> Result<String> {
        let code = params
            .get_text("code")
            .ok_or(Dc09Error::MissingField { field: "code" })?;
        let qualifier = params.get_u64("q").unwrap_or(1);
        let area = params.get_u64("area").unwrap_or(0);
        let zone = params.get_u64("zone").unwrap_or(0);
        Ok(format!(
            "[#{}|{}{} {:02} {:03}]",
            account, qualifier, code, area, zone
        ))
    }
}

impl PayloadEncoder for StandardPayloadEncoder {
    fn encode(
        &self,
        message_type: MessageType,
        account: &str,
        params: &EventParams,
    ) -> Result<String> {
        let account = params
            .get_text("account")
            .unwrap_or_else(|| account.to_string());
        match message_type {
            MessageType::SiaDcs => Self::sia(&account, params),
            MessageType::AdmCid => Self::cid(&account, params),
        }
    }

    fn extra(&self, params: &EventParams) -> Option<String> {
        let mut out = String::new();
        if let Some(lon) = params.get_text("lon") {
            out.push_str(&format!("[X{}]", lon));
        }
        if let Some(lat) = params.get_text("lat") {
            out.push_str(&format!("[Y{}]", lat));
        }
        if let Some(v) = params.get_text("verification") {
            out.push_str(&format!("[V{}]", v));
        }
        (!out.is_empty()).then_some(out)
    }
}
