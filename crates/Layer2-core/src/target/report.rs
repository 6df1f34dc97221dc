//! Scan report import (nmap XML, Nessus v2)
//!
//! Only open services whose name maps to the selected protocol are kept.

use super::TargetSpec;
use nexec_foundation::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Service names scanners report for each protocol
fn service_names(protocol: &str) -> &'static [&'static str] {
    match protocol {
        "smb" => &["netbios-ssn", "microsoft-ds", "cifs", "smb"],
        "ssh" => &["ssh"],
        "ftp" => &["ftp"],
        "ldap" => &["ldap", "ldaps"],
        "mssql" => &["ms-sql-s", "mssql"],
        "rdp" => &["ms-wbt-server", "msrdp", "rdp"],
        "winrm" => &["wsman", "winrm"],
        "vnc" => &["vnc", "vnc-http"],
        "wmi" => &["msrpc"],
        "nfs" => &["nfs"],
        _ => &[],
    }
}

/// Whether a reported service belongs to `protocol`.
///
/// The generic `tcp` protocol accepts every open port.
pub fn service_matches(protocol: &str, service: &str) -> bool {
    if protocol == "tcp" {
        return true;
    }
    let known = service_names(protocol);
    if known.is_empty() {
        service.eq_ignore_ascii_case(protocol)
    } else {
        known.iter().any(|name| name.eq_ignore_ascii_case(service))
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn xml_error(e: quick_xml::Error) -> Error {
    Error::InvalidInput(format!("malformed scan report: {}", e))
}

/// Open ports from an nmap `-oX` report.
pub fn parse_nmap_xml(content: &str, protocol: &str) -> Result<Vec<TargetSpec>> {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut targets = Vec::new();

    let mut host: Option<String> = None;
    let mut port: Option<u16> = None;
    let mut open = false;
    let mut service: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) | Event::Empty(ref e) => match local_name(e).as_str() {
                "host" => host = None,
                "address" => {
                    let family = attr(e, "addrtype").unwrap_or_default();
                    if host.is_none() && (family == "ipv4" || family == "ipv6") {
                        host = attr(e, "addr");
                    }
                }
                "port" => {
                    port = attr(e, "portid").and_then(|p| p.parse().ok());
                    open = false;
                    service = None;
                }
                "state" => open = attr(e, "state").as_deref() == Some("open"),
                "service" => service = attr(e, "name"),
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"port" => {
                    // Unidentified services only count for the generic probe
                    let wanted = match &service {
                        Some(s) => service_matches(protocol, s),
                        None => protocol == "tcp",
                    };
                    if let (Some(h), Some(p)) = (&host, port) {
                        if open && wanted {
                            targets.push(TargetSpec::new(h.clone()).with_port(p));
                        }
                    }
                    port = None;
                }
                b"host" => host = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

/// Matching services from a `.nessus` (v2) export.
pub fn parse_nessus(content: &str, protocol: &str) -> Result<Vec<TargetSpec>> {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut targets: Vec<TargetSpec> = Vec::new();
    let mut host: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) | Event::Empty(ref e) => match local_name(e).as_str() {
                "ReportHost" => host = attr(e, "name"),
                "ReportItem" => {
                    let port = attr(e, "port").and_then(|p| p.parse::<u16>().ok());
                    let service = attr(e, "svc_name").unwrap_or_default();
                    if let (Some(h), Some(p)) = (&host, port) {
                        let target = TargetSpec::new(h.clone()).with_port(p);
                        // Nessus emits one item per plugin, so ports repeat
                        if p != 0 && service_matches(protocol, &service) && !targets.contains(&target)
                        {
                            targets.push(target);
                        }
                    }
                }
                _ => {}
            },
            Event::End(ref e) if e.local_name().as_ref() == b"ReportHost" => host = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}
