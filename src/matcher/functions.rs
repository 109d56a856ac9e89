//! Builtin matcher functions and the host-extensible function table.
//!
//! Every builtin takes string arguments and returns a boolean. Pattern
//! compilation (the `keyMatch` family and `regexMatch`) goes through a
//! process-wide compiled-regex cache keyed by the built pattern text, so
//! repeated enforcement against the same policies compiles each pattern
//! once.
//!
//! The `g`-family is intentionally absent here: those calls resolve against
//! the enforcer's role managers at evaluation time (see
//! [`super::eval::LinkQuery`]). A host registration under the same name
//! takes precedence, which is also the override hook for custom
//! domain-matching semantics.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dashmap::DashMap;
use ipnetwork::IpNetwork;
use regex::Regex;

use super::eval::Value;
use crate::error::{Error, Result};

/// Signature of a registered matcher function.
pub type MatcherFunction = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Function table
// ─────────────────────────────────────────────────────────────────────────────

/// Named functions callable from matcher expressions.
///
/// [`FunctionMap::default`] seeds the table with all builtins; hosts may
/// register additional functions or shadow a builtin by reusing its name.
#[derive(Clone)]
pub struct FunctionMap {
    inner: HashMap<String, MatcherFunction>,
}

impl std::fmt::Debug for FunctionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionMap").field("names", &names).finish()
    }
}

impl Default for FunctionMap {
    fn default() -> Self {
        let mut map = Self {
            inner: HashMap::new(),
        };
        map.register("keyMatch", pure2("keyMatch", key_match));
        map.register("keyMatch2", fallible2("keyMatch2", key_match2));
        map.register("keyMatch3", fallible2("keyMatch3", key_match3));
        map.register("keyMatch4", fallible2("keyMatch4", key_match4));
        map.register("keyMatch5", fallible2("keyMatch5", key_match5));
        map.register("regexMatch", fallible2("regexMatch", regex_match));
        map.register("ipMatch", fallible2("ipMatch", ip_match));
        map.register("ipMatch2", fallible2("ipMatch2", ip_match2));
        map.register("ipMatch3", fallible2("ipMatch3", ip_match3));
        map.register("globMatch", fallible2("globMatch", glob_match));
        map.register("globMatch2", fallible2("globMatch2", glob_match2));
        map.register("globMatch3", fallible2("globMatch3", glob_match3));
        map.register("timeMatch", fallible3("timeMatch", time_match));
        map
    }
}

impl FunctionMap {
    /// An empty table with no builtins.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Register a function under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, f: MatcherFunction) {
        self.inner.insert(name.into(), f);
    }

    /// Remove the function registered under `name`.
    ///
    /// Returns `true` when an entry was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.inner.remove(name).is_some()
    }

    /// Look up a function by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MatcherFunction> {
        self.inner.get(name)
    }

    /// Whether a function is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }
}

fn expect_str_args(name: &str, args: &[Value], n: usize) -> Result<Vec<String>> {
    if args.len() != n {
        return Err(Error::matcher_runtime(format!(
            "`{name}` takes {n} arguments, got {}",
            args.len()
        )));
    }
    args.iter()
        .enumerate()
        .map(|(i, v)| {
            v.coerce_str().ok_or_else(|| {
                Error::matcher_runtime(format!("`{name}`: argument {} is not a string", i + 1))
            })
        })
        .collect()
}

fn pure2(name: &'static str, f: fn(&str, &str) -> bool) -> MatcherFunction {
    Arc::new(move |args| {
        let a = expect_str_args(name, args, 2)?;
        Ok(Value::Bool(f(&a[0], &a[1])))
    })
}

fn fallible2(name: &'static str, f: fn(&str, &str) -> Result<bool>) -> MatcherFunction {
    Arc::new(move |args| {
        let a = expect_str_args(name, args, 2)?;
        f(&a[0], &a[1]).map(Value::Bool)
    })
}

fn fallible3(name: &'static str, f: fn(&str, &str, &str) -> Result<bool>) -> MatcherFunction {
    Arc::new(move |args| {
        let a = expect_str_args(name, args, 3)?;
        f(&a[0], &a[1], &a[2]).map(Value::Bool)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Compiled-pattern cache
// ─────────────────────────────────────────────────────────────────────────────

fn regex_cache() -> &'static DashMap<String, Regex> {
    static CACHE: OnceLock<DashMap<String, Regex>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

/// Full-string match of `s` against `body`, compiling `^(?:body)$` once.
fn cached_full_match(body: &str, s: &str) -> Result<bool> {
    if let Some(re) = regex_cache().get(body) {
        return Ok(re.is_match(s));
    }
    let re = Regex::new(&format!("^(?:{body})$"))
        .map_err(|e| Error::matcher_runtime(format!("bad pattern `{body}`: {e}")))?;
    let matched = re.is_match(s);
    regex_cache().insert(body.to_string(), re);
    Ok(matched)
}

// ─────────────────────────────────────────────────────────────────────────────
// keyMatch family
// ─────────────────────────────────────────────────────────────────────────────

/// `key2` may end in `*`: `/foo/*` matches `/foo/bar`.
pub(crate) fn key_match(key1: &str, key2: &str) -> bool {
    match key2.find('*') {
        None => key1 == key2,
        Some(i) => {
            let prefix = &key2[..i];
            if key1.len() > prefix.len() {
                key1.starts_with(prefix)
            } else {
                key1 == prefix
            }
        }
    }
}

/// `:name` segments in `key2` match one path component:
/// `/resource/:id` matches `/resource/123`.
pub(crate) fn key_match2(key1: &str, key2: &str) -> Result<bool> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r":[A-Za-z0-9_]+").expect("valid regex"));
    let pat = key2.replace("/*", "/.*");
    let pat = token.replace_all(&pat, "[^/]+");
    cached_full_match(&pat, key1)
}

/// `{name}` segments in `key2` match one path component:
/// `/resource/{id}` matches `/resource/123`.
pub(crate) fn key_match3(key1: &str, key2: &str) -> Result<bool> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r"\{[A-Za-z0-9_]+\}").expect("valid regex"));
    let pat = key2.replace("/*", "/.*");
    let pat = token.replace_all(&pat, "[^/]+");
    cached_full_match(&pat, key1)
}

/// Like [`key_match3`], but equal `{name}` references must bind to equal
/// substrings: `/{id}/copy/{id}` matches `/1/copy/1` but not `/1/copy/2`.
pub(crate) fn key_match4(key1: &str, key2: &str) -> Result<bool> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("valid regex"));

    let pat = key2.replace("/*", "/.*");
    let mut names = Vec::new();
    let built = token.replace_all(&pat, |caps: &regex::Captures<'_>| {
        names.push(caps[1].to_string());
        "([^/]+)".to_string()
    });

    let re = Regex::new(&format!("^{built}$"))
        .map_err(|e| Error::matcher_runtime(format!("bad pattern `{key2}`: {e}")))?;
    let Some(caps) = re.captures(key1) else {
        return Ok(false);
    };

    let mut bound: HashMap<&str, &str> = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        let got = caps.get(i + 1).map_or("", |m| m.as_str());
        if let Some(prev) = bound.insert(name.as_str(), got) {
            if prev != got {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Multi-star glob: every `*` in `key2` spans arbitrary text, so
/// `/api/*/resource/*` matches `/api/v2/resource/123/detail`.
pub(crate) fn key_match5(key1: &str, key2: &str) -> Result<bool> {
    let pat = key2
        .split('*')
        .map(|part| regex::escape(part))
        .collect::<Vec<_>>()
        .join(".*");
    cached_full_match(&pat, key1)
}

// ─────────────────────────────────────────────────────────────────────────────
// regexMatch
// ─────────────────────────────────────────────────────────────────────────────

/// Full-string regular-expression match.
pub(crate) fn regex_match(s: &str, pattern: &str) -> Result<bool> {
    cached_full_match(pattern, s)
}

// ─────────────────────────────────────────────────────────────────────────────
// ipMatch family
// ─────────────────────────────────────────────────────────────────────────────

fn parse_ip(name: &str, s: &str) -> Result<IpAddr> {
    s.trim()
        .parse()
        .map_err(|_| Error::matcher_runtime(format!("`{name}`: invalid IP address `{s}`")))
}

/// Exact address or CIDR containment, IPv4 and IPv6:
/// `192.168.2.123` matches `192.168.2.0/24`.
pub(crate) fn ip_match(ip: &str, cidr: &str) -> Result<bool> {
    let ip = parse_ip("ipMatch", ip)?;
    if let Ok(net) = cidr.trim().parse::<IpNetwork>() {
        return Ok(net.contains(ip));
    }
    let other = parse_ip("ipMatch", cidr)?;
    Ok(ip == other)
}

/// [`ip_match`] with IPv6 literals normalized before comparison, so
/// `::ffff:192.168.2.123` matches `192.168.2.0/24`.
pub(crate) fn ip_match2(ip: &str, cidr: &str) -> Result<bool> {
    let parsed = parse_ip("ipMatch2", ip)?;
    let normalized = match parsed {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(parsed, IpAddr::V4),
        IpAddr::V4(_) => parsed,
    };
    if let Ok(net) = cidr.trim().parse::<IpNetwork>() {
        return Ok(net.contains(normalized) || net.contains(parsed));
    }
    let other = parse_ip("ipMatch2", cidr)?;
    Ok(normalized == other || parsed == other)
}

fn ip_ordinal(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// [`ip_match`] extended with `a-b` address ranges:
/// `192.168.2.5` matches `192.168.2.1-192.168.2.10`.
pub(crate) fn ip_match3(ip: &str, range: &str) -> Result<bool> {
    if let Some((lo, hi)) = range.split_once('-') {
        let ip = parse_ip("ipMatch3", ip)?;
        let lo = parse_ip("ipMatch3", lo)?;
        let hi = parse_ip("ipMatch3", hi)?;
        if lo.is_ipv4() != ip.is_ipv4() || hi.is_ipv4() != ip.is_ipv4() {
            return Ok(false);
        }
        let n = ip_ordinal(ip);
        return Ok(ip_ordinal(lo) <= n && n <= ip_ordinal(hi));
    }
    ip_match(ip, range)
}

// ─────────────────────────────────────────────────────────────────────────────
// globMatch family
// ─────────────────────────────────────────────────────────────────────────────

fn glob_with(name: &str, key: &str, pattern: &str) -> Result<bool> {
    let compiled = glob::Pattern::new(pattern)
        .map_err(|e| Error::matcher_runtime(format!("`{name}`: bad glob `{pattern}`: {e}")))?;
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    Ok(compiled.matches_with(key, options))
}

/// Path glob where `*` stays within one path component:
/// `/foo/*` matches `/foo/bar` but not `/foo/bar/baz`.
pub(crate) fn glob_match(key: &str, pattern: &str) -> Result<bool> {
    glob_with("globMatch", key, pattern)
}

/// Path glob where a `**` component spans separators:
/// `/foo/**` matches `/foo/bar/baz`.
pub(crate) fn glob_match2(key: &str, pattern: &str) -> Result<bool> {
    glob_with("globMatch2", key, pattern)
}

/// Path glob with character classes: `/data[12]/*` matches `/data1/x`.
pub(crate) fn glob_match3(key: &str, pattern: &str) -> Result<bool> {
    glob_with("globMatch3", key, pattern)
}

// ─────────────────────────────────────────────────────────────────────────────
// timeMatch
// ─────────────────────────────────────────────────────────────────────────────

fn parse_time(name: &str, s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(t.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }
    Err(Error::matcher_runtime(format!(
        "`{name}`: unparseable timestamp `{s}`"
    )))
}

/// Timestamp containment: `t` within `[start, end]`. Either bound may be
/// `_` for "unbounded". Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, and bare
/// `YYYY-MM-DD` (midnight UTC).
pub(crate) fn time_match(t: &str, start: &str, end: &str) -> Result<bool> {
    let t = parse_time("timeMatch", t)?;
    if start.trim() != "_" && t < parse_time("timeMatch", start)? {
        return Ok(false);
    }
    if end.trim() != "_" && t > parse_time("timeMatch", end)? {
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── keyMatch ──────────────────────────────────────────────────────

    #[test]
    fn key_match_glob_suffix() {
        assert!(key_match("/foo/bar", "/foo/*"));
        assert!(key_match("/foo/bar/baz", "/foo/*"));
        assert!(!key_match("/qux", "/foo/*"));
        assert!(key_match("/foo", "/foo"));
        assert!(!key_match("/foo", "/foo/*"));
    }

    #[test]
    fn key_match2_named_segment() {
        assert!(key_match2("/resource/123", "/resource/:id").unwrap());
        assert!(!key_match2("/resource/123/sub", "/resource/:id").unwrap());
        assert!(key_match2("/user/7/books", "/user/:id/books").unwrap());
        assert!(!key_match2("/user/7/films", "/user/:id/books").unwrap());
    }

    #[test]
    fn key_match3_braced_segment() {
        assert!(key_match3("/resource/123", "/resource/{id}").unwrap());
        assert!(!key_match3("/resource/123/sub", "/resource/{id}").unwrap());
        assert!(key_match3("/proxy/a/b", "/proxy/{name}/*").unwrap());
    }

    #[test]
    fn key_match4_backreferences() {
        assert!(key_match4("/1/copy/1", "/{id}/copy/{id}").unwrap());
        assert!(!key_match4("/1/copy/2", "/{id}/copy/{id}").unwrap());
        assert!(key_match4("/1/note/2", "/{id}/note/{nid}").unwrap());
    }

    #[test]
    fn key_match5_multi_star() {
        assert!(key_match5("/api/v2/resource/123/detail", "/api/*/resource/*").unwrap());
        assert!(key_match5("/api/v2", "/api/*").unwrap());
        assert!(!key_match5("/web/v2", "/api/*").unwrap());
    }

    // ── regexMatch ────────────────────────────────────────────────────

    #[test]
    fn regex_match_is_full_string() {
        assert!(regex_match("alice", "a.*e").unwrap());
        // A partial match is not enough.
        assert!(!regex_match("alice_x", "a.*e").unwrap());
        assert!(regex_match("123", r"\d+").unwrap());
    }

    #[test]
    fn regex_match_bad_pattern_is_runtime_error() {
        assert!(regex_match("x", "(").is_err());
    }

    // ── ipMatch ───────────────────────────────────────────────────────

    #[test]
    fn ip_match_cidr_and_exact() {
        assert!(ip_match("192.168.2.123", "192.168.2.0/24").unwrap());
        assert!(!ip_match("192.168.3.123", "192.168.2.0/24").unwrap());
        assert!(ip_match("10.0.0.1", "10.0.0.1").unwrap());
        assert!(ip_match("2001:db8::1", "2001:db8::/32").unwrap());
    }

    #[test]
    fn ip_match2_mapped_ipv6() {
        assert!(ip_match2("::ffff:192.168.2.5", "192.168.2.0/24").unwrap());
        assert!(ip_match2("2001:db8::1", "2001:db8::/32").unwrap());
    }

    #[test]
    fn ip_match3_ranges() {
        assert!(ip_match3("192.168.2.5", "192.168.2.1-192.168.2.10").unwrap());
        assert!(!ip_match3("192.168.2.11", "192.168.2.1-192.168.2.10").unwrap());
        assert!(ip_match3("10.0.0.1", "10.0.0.0/8").unwrap());
        // Mixed families never match a range.
        assert!(!ip_match3("::1", "10.0.0.1-10.0.0.9").unwrap());
    }

    #[test]
    fn ip_match_invalid_input_is_runtime_error() {
        assert!(ip_match("not-an-ip", "10.0.0.0/8").is_err());
        assert!(ip_match("10.0.0.1", "not-a-net").is_err());
    }

    // ── globMatch ─────────────────────────────────────────────────────

    #[test]
    fn glob_match_single_component() {
        assert!(glob_match("/foo/bar", "/foo/*").unwrap());
        assert!(!glob_match("/foo/bar/baz", "/foo/*").unwrap());
    }

    #[test]
    fn glob_match2_double_star_spans_separators() {
        assert!(glob_match2("/foo/bar/baz", "/foo/**").unwrap());
        assert!(!glob_match2("/qux/bar", "/foo/**").unwrap());
    }

    #[test]
    fn glob_match3_character_classes() {
        assert!(glob_match3("/data1/report", "/data[12]/*").unwrap());
        assert!(glob_match3("/data2/report", "/data[12]/*").unwrap());
        assert!(!glob_match3("/data3/report", "/data[12]/*").unwrap());
    }

    // ── timeMatch ─────────────────────────────────────────────────────

    #[test]
    fn time_match_containment() {
        assert!(time_match("2025-06-15 12:00:00", "2025-01-01 00:00:00", "2025-12-31 23:59:59").unwrap());
        assert!(!time_match("2026-01-01 00:00:00", "2025-01-01 00:00:00", "2025-12-31 23:59:59").unwrap());
    }

    #[test]
    fn time_match_open_bounds() {
        assert!(time_match("2025-06-15 12:00:00", "_", "2025-12-31 23:59:59").unwrap());
        assert!(time_match("2025-06-15 12:00:00", "2025-01-01 00:00:00", "_").unwrap());
        assert!(time_match("1999-01-01", "_", "_").unwrap());
    }

    #[test]
    fn time_match_rfc3339() {
        assert!(time_match(
            "2025-06-15T12:00:00Z",
            "2025-06-15T00:00:00+02:00",
            "2025-06-16T00:00:00Z"
        )
        .unwrap());
    }

    // ── Registration ──────────────────────────────────────────────────

    #[test]
    fn register_and_unregister() {
        let mut map = FunctionMap::default();
        assert!(map.contains("keyMatch"));

        map.register(
            "isOwner",
            Arc::new(|args: &[Value]| {
                let a = expect_str_args("isOwner", args, 2)?;
                Ok(Value::Bool(a[0] == a[1]))
            }),
        );
        assert!(map.contains("isOwner"));
        assert!(map.unregister("isOwner"));
        assert!(!map.contains("isOwner"));
        assert!(!map.unregister("isOwner"));
    }
}
