//! The small text block written into the lockfile body at creation
//! (§3 `LockfileContents`, §4.B).
//!
//! Parsing is deliberately hand-rolled rather than going through `serde`:
//! the spec calls for tolerance of trailing garbage and corruption, with
//! any unreadable field downgraded to "unknown" rather than a hard parse
//! error. A record with unknown fields is treated as hostile by the
//! sweeper (§4.C) — it cannot prove the record is same-host-ours, so it
//! leaves the file alone.

use chrono::{DateTime, Utc};

/// Parsed contents of a lockfile, or as much of it as survived corruption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockfileContents {
    pub host: Option<String>,
    pub pid: Option<u32>,
    pub ppid: Option<u32>,
    pub time: Option<DateTime<Utc>>,
}

impl LockfileContents {
    pub fn new(host: String, pid: u32, ppid: u32, time: DateTime<Utc>) -> Self {
        Self {
            host: Some(host),
            pid: Some(pid),
            ppid: Some(ppid),
            time: Some(time),
        }
    }

    /// An all-`None` record: "unknown", per §4.B. Never treated as
    /// same-host-ours by the sweeper.
    pub fn unknown() -> Self {
        Self {
            host: None,
            pid: None,
            ppid: None,
            time: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.host.is_none() && self.pid.is_none()
    }

    /// Serialize as newline-delimited `key=value` text, trailing section
    /// reserved for future/free-form fields and ignored on read.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(ref host) = self.host {
            out.push_str(&format!("host={host}\n"));
        }
        if let Some(pid) = self.pid {
            out.push_str(&format!("pid={pid}\n"));
        }
        if let Some(ppid) = self.ppid {
            out.push_str(&format!("ppid={ppid}\n"));
        }
        if let Some(time) = self.time {
            out.push_str(&format!("time={}\n", time.to_rfc3339()));
        }
        out
    }

    /// Parse a `key=value` text block. Never fails: any missing or
    /// malformed field is simply absent from the result, and garbage
    /// lines (no `=`, duplicate keys past the first, trailing noise) are
    /// silently skipped.
    pub fn decode(text: &str) -> Self {
        let mut host = None;
        let mut pid = None;
        let mut ppid = None;
        let mut time = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "host" if host.is_none() => host = Some(value.to_string()),
                "pid" if pid.is_none() => pid = value.parse().ok(),
                "ppid" if ppid.is_none() => ppid = value.parse().ok(),
                "time" if time.is_none() => {
                    time = DateTime::parse_from_rfc3339(value)
                        .ok()
                        .map(|t| t.with_timezone(&Utc));
                }
                _ => {}
            }
        }

        Self {
            host,
            pid,
            ppid,
            time,
        }
    }
}
