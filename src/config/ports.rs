//! Socket-binding ports in the server XML configuration.
//!
//! The configuration is read with quick-xml so that commented-out or
//! unrelated elements never match. Writing splices the new value over the
//! exact bytes of the `port` attribute, leaving the rest of the file as it was.

use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;

const SOCKET_BINDING: &[u8] = b"socket-binding";

/// Which socket binding a port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// Management port the control script connects to for shutdown and reload.
    Server,
    /// Plain HTTP connector.
    Http,
    /// HTTPS connector.
    Https,
}

impl PortKind {
    /// The `name` attribute of the matching `<socket-binding>` element.
    pub fn binding_name(self) -> &'static str {
        match self {
            PortKind::Server => "management-http",
            PortKind::Http => "http",
            PortKind::Https => "https",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PortKind::Server => "Server",
            PortKind::Http => "Http",
            PortKind::Https => "Https",
        };
        f.write_str(label)
    }
}

/// Port values captured from one read of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSnapshot {
    pub server: String,
    pub http: String,
    pub https: String,
}

impl PortSnapshot {
    /// Reads all three ports of `config_path`.
    pub async fn read(config_path: &Path) -> Result<Self> {
        let xml = read_config(config_path).await?;
        Self::from_xml(&xml)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(Self {
            server: find_port(xml, PortKind::Server)?,
            http: find_port(xml, PortKind::Http)?,
            https: find_port(xml, PortKind::Https)?,
        })
    }

    pub fn get(&self, kind: PortKind) -> &str {
        match kind {
            PortKind::Server => &self.server,
            PortKind::Http => &self.http,
            PortKind::Https => &self.https,
        }
    }
}

/// Reads the raw `port` attribute of `kind` from the configuration file.
///
/// Returns [`Error::ConfigNotFound`] when the file does not exist, which is
/// the normal state of a freshly added server whose copy is still incomplete.
pub async fn get_port(config_path: &Path, kind: PortKind) -> Result<String> {
    let xml = read_config(config_path).await?;
    find_port(&xml, kind)
}

/// Rewrites the `port` attribute of `kind` in place.
pub async fn set_port(config_path: &Path, kind: PortKind, value: &str) -> Result<()> {
    let xml = read_config(config_path).await?;
    let updated = replace_port(&xml, kind, value)?;
    tokio::fs::write(config_path, updated).await?;
    tracing::debug!(path = %config_path.display(), %kind, %value, "Rewrote port attribute");
    Ok(())
}

/// Resolves a port attribute to a number.
///
/// WildFly ports are usually expressions such as `${jboss.http.port:8080}`;
/// the default after the colon is used in that case.
pub fn effective_port(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    let value = match raw.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        Some(expression) => expression.rsplit_once(':')?.1,
        None => raw,
    };
    value.trim().parse().ok()
}

async fn read_config(config_path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(config_path).await {
        Ok(xml) => Ok(xml),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::ConfigNotFound(config_path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Finds the port value of `kind` in an XML document.
pub fn find_port(xml: &str, kind: PortKind) -> Result<String> {
    let tag = locate_binding(xml, kind)?;
    let value_range = port_value_range(&xml[tag.clone()]).ok_or_else(|| {
        Error::ConfigParse(format!(
            "socket-binding '{}' has no port attribute",
            kind.binding_name()
        ))
    })?;
    let start = tag.start + value_range.start;
    let end = tag.start + value_range.end;
    Ok(xml[start..end].to_string())
}

/// Returns `xml` with the port value of `kind` replaced by `value`.
pub fn replace_port(xml: &str, kind: PortKind, value: &str) -> Result<String> {
    let tag = locate_binding(xml, kind)?;
    let value_range = port_value_range(&xml[tag.clone()]).ok_or_else(|| {
        Error::ConfigParse(format!(
            "socket-binding '{}' has no port attribute",
            kind.binding_name()
        ))
    })?;
    let start = tag.start + value_range.start;
    let end = tag.start + value_range.end;

    let mut updated = String::with_capacity(xml.len() + value.len());
    updated.push_str(&xml[..start]);
    updated.push_str(value);
    updated.push_str(&xml[end..]);
    Ok(updated)
}

/// Byte range of the start tag of the binding for `kind`.
fn locate_binding(xml: &str, kind: PortKind) -> Result<Range<usize>> {
    let mut reader = Reader::from_str(xml);
    loop {
        let start = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| Error::ConfigParse(format!("Malformed server configuration: {}", e)))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) if e.name().as_ref() == SOCKET_BINDING => {
                if is_binding(e, kind)? {
                    let end = reader.buffer_position() as usize;
                    return Ok(start..end);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(Error::ConfigParse(format!(
        "No socket-binding named '{}'",
        kind.binding_name()
    )))
}

fn is_binding(element: &BytesStart<'_>, kind: PortKind) -> Result<bool> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| Error::ConfigParse(format!("Malformed attribute: {}", e)))?;
        if attr.key.as_ref() == b"name" {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::ConfigParse(format!("Malformed attribute value: {}", e)))?;
            return Ok(value == kind.binding_name());
        }
    }
    Ok(false)
}

/// Byte range of the `port` attribute value inside a single start tag.
fn port_value_range(tag: &str) -> Option<Range<usize>> {
    static PORT_ATTR: OnceLock<Regex> = OnceLock::new();
    let re = PORT_ATTR.get_or_init(|| {
        Regex::new(r#"\sport\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("port attribute pattern is valid")
    });
    let captures = re.captures(tag)?;
    captures.get(1).or_else(|| captures.get(2)).map(|m| m.range())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANDALONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<server xmlns="urn:jboss:domain:20.0">
    <!-- <socket-binding name="http" port="1111"/> -->
    <socket-binding-group name="standard-sockets" default-interface="public" port-offset="${jboss.socket.binding.port-offset:0}">
        <socket-binding name="ajp" port="${jboss.ajp.port:8009}"/>
        <socket-binding name="http" port="${jboss.http.port:8080}"/>
        <socket-binding name="https" port='8443'/>
        <socket-binding name="management-http" interface="management" port="9990"/>
        <socket-binding name="txn-recovery-environment" port="4712"/>
    </socket-binding-group>
</server>
"#;

    #[test]
    fn test_find_ports_by_kind() {
        assert_eq!(find_port(STANDALONE, PortKind::Server).unwrap(), "9990");
        assert_eq!(find_port(STANDALONE, PortKind::Http).unwrap(), "${jboss.http.port:8080}");
        assert_eq!(find_port(STANDALONE, PortKind::Https).unwrap(), "8443");
    }

    #[test]
    fn test_replace_port_touches_only_the_value() {
        let updated = replace_port(STANDALONE, PortKind::Http, "9080").unwrap();

        assert_eq!(find_port(&updated, PortKind::Http).unwrap(), "9080");
        let expected = STANDALONE.replace("${jboss.http.port:8080}", "9080");
        assert_eq!(updated, expected);
    }

    #[test]
    fn test_replace_single_quoted_port() {
        let updated = replace_port(STANDALONE, PortKind::Https, "9443").unwrap();
        assert!(updated.contains(r#"<socket-binding name="https" port='9443'/>"#));
    }

    #[test]
    fn test_missing_binding_is_a_parse_error() {
        let xml = r#"<server><socket-binding name="http" port="8080"/></server>"#;
        assert!(matches!(find_port(xml, PortKind::Server), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_effective_port() {
        assert_eq!(effective_port("${jboss.http.port:8080}"), Some(8080));
        assert_eq!(effective_port(" 9990 "), Some(9990));
        assert_eq!(effective_port("${jboss.http.port}"), None);
        assert_eq!(effective_port("abc"), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let err = get_port(Path::new("/definitely/not/here.xml"), PortKind::Http)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }
}
