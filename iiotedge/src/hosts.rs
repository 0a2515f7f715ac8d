//! Host name/IP discovery and the `extrahosts` file.
//!
//! The compose templates carry an `${EXTRAHOSTS}` token so the containers
//! can resolve local and external hosts even without DNS (especially on
//! Windows). The entries come from the machine the tool runs on plus an
//! optional hosts-file-style `extrahosts` file next to the templates.

use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::Path;
use std::process::Command;

use log::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub host: String,
    pub ip: String,
}

/// Primary local IP address, discovered by connecting a UDP socket to a
/// public address (no packet is sent, the peer does not have to be
/// reachable).
pub fn local_ip_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(("8.8.8.8", 1)).ok()?;
    Some(socket.local_addr().ok()?.ip())
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Short hostname and FQDN of this machine. The FQDN falls back to the
/// short name when the system cannot report one.
pub fn host_names() -> Option<(String, String)> {
    let hostname = std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("COMPUTERNAME").ok().filter(|name| !name.is_empty()))
        .or_else(|| command_stdout("hostname", &[]))?;
    let fqdn = command_stdout("hostname", &["-f"]).unwrap_or_else(|| hostname.clone());
    Some((hostname, fqdn))
}

/// Parses an `extrahosts` file in hosts-file syntax. Entries with an
/// invalid IP address are warned about and skipped; a missing file is an
/// empty list.
pub fn read_extra_hosts(path: &Path) -> io::Result<Vec<HostEntry>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.split('#').next().unwrap_or("");
        let mut fields = line.split_whitespace();
        let Some(ip) = fields.next() else { continue };
        if ip.parse::<Ipv4Addr>().is_err() {
            warn!(
                "There is an entry in extrahosts with invalid IP address syntax: '{}'. Ignoring...",
                ip
            );
            continue;
        }
        for host in fields {
            entries.push(HostEntry {
                host: host.to_string(),
                ip: ip.to_string(),
            });
        }
    }
    Ok(entries)
}

/// Renders the entries as the YAML list block substituted for the
/// `${EXTRAHOSTS}` token. The first entry sits on the token's own line;
/// continuation lines carry the templates' list indentation.
pub fn format_extra_hosts(entries: &[HostEntry]) -> String {
    let mut block = String::new();
    for (index, entry) in entries.iter().enumerate() {
        if index > 0 {
            block.push_str("            ");
        }
        block.push_str(&format!("- \"{}:{}\"", entry.host, entry.ip));
        if index + 1 < entries.len() {
            block.push('\n');
        }
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_extrahosts(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extrahosts");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn parses_hosts_file_syntax() {
        let (_dir, path) = write_extrahosts(
            "# comment\n\n10.0.0.5 plc-a plc-a.factory.local # trailing comment\n10.0.0.6 scanner\n",
        );
        let entries = read_extra_hosts(&path).unwrap();
        assert_eq!(
            entries,
            vec![
                HostEntry {
                    host: "plc-a".to_string(),
                    ip: "10.0.0.5".to_string()
                },
                HostEntry {
                    host: "plc-a.factory.local".to_string(),
                    ip: "10.0.0.5".to_string()
                },
                HostEntry {
                    host: "scanner".to_string(),
                    ip: "10.0.0.6".to_string()
                },
            ]
        );
    }

    #[test]
    fn invalid_ip_entries_are_skipped() {
        let (_dir, path) = write_extrahosts("not-an-ip plc-a\n10.0.0.7 valid\n");
        let entries = read_extra_hosts(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].host, "valid");
    }

    #[test]
    fn missing_file_is_an_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_extra_hosts(&dir.path().join("extrahosts"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn block_formatting_indents_continuation_lines_only() {
        let entries = vec![
            HostEntry {
                host: "gateway".to_string(),
                ip: "10.0.0.1".to_string(),
            },
            HostEntry {
                host: "plc-a".to_string(),
                ip: "10.0.0.5".to_string(),
            },
            HostEntry {
                host: "plc-b".to_string(),
                ip: "10.0.0.6".to_string(),
            },
        ];
        assert_eq!(
            format_extra_hosts(&entries),
            "- \"gateway:10.0.0.1\"\n            - \"plc-a:10.0.0.5\"\n            - \"plc-b:10.0.0.6\""
        );
        assert_eq!(format_extra_hosts(&[]), "");
    }
}
