//! User-agent decoding. The pipeline only relies on [`UserAgentParser`] being
//! pure; [`HeuristicUaParser`] is a token-based default.

use serde::{Deserialize, Serialize};

/// Family reported when a component is not recognized.
pub const UNKNOWN_FAMILY: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub family: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub family: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub family: String,
    pub brand: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUserAgent {
    pub browser: BrowserInfo,
    pub os: OsInfo,
    pub device: DeviceInfo,
    pub is_mobile: bool,
    pub is_tablet: bool,
    pub is_pc: bool,
}

pub trait UserAgentParser: Send + Sync {
    /// Must return the same value for the same input.
    fn parse(&self, user_agent: &str) -> ParsedUserAgent;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicUaParser;

impl HeuristicUaParser {
    pub fn new() -> Self {
        Self
    }
}

impl UserAgentParser for HeuristicUaParser {
    fn parse(&self, user_agent: &str) -> ParsedUserAgent {
        let ua = user_agent.trim();
        // ASCII lowering keeps byte offsets aligned with `ua`.
        let lower = ua.to_ascii_lowercase();

        let browser = detect_browser(ua, &lower);
        let os = detect_os(ua, &lower);
        let (device, is_mobile, is_tablet) = detect_device(&lower, &os.family);
        let is_pc = !is_mobile
            && !is_tablet
            && device.family != "Spider"
            && matches!(os.family.as_str(), "Windows" | "Mac OS X" | "Linux" | "Chrome OS");

        ParsedUserAgent {
            browser,
            os,
            device,
            is_mobile,
            is_tablet,
            is_pc,
        }
    }
}

/// Version digits (and `.`/`_`) right after `token`; underscores become dots.
fn version_after(ua: &str, lower: &str, token: &str) -> Option<String> {
    let start = lower.find(token)? + token.len();
    let v: String = ua[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '_')
        .map(|c| if c == '_' { '.' } else { c })
        .collect();
    let v = v.trim_end_matches('.').to_string();
    (!v.is_empty()).then_some(v)
}

fn detect_browser(ua: &str, lower: &str) -> BrowserInfo {
    const RULES: &[(&str, &str)] = &[
        ("edg/", "Edge"),
        ("edge/", "Edge"),
        ("opr/", "Opera"),
        ("opera/", "Opera"),
        ("firefox/", "Firefox"),
        ("fxios/", "Firefox"),
        ("crios/", "Chrome"),
        ("chrome/", "Chrome"),
    ];
    for (token, family) in RULES {
        if lower.contains(token) {
            return BrowserInfo {
                family: family.to_string(),
                version: version_after(ua, lower, token).unwrap_or_default(),
            };
        }
    }
    if lower.contains("safari/") && lower.contains("version/") {
        return BrowserInfo {
            family: "Safari".to_string(),
            version: version_after(ua, lower, "version/").unwrap_or_default(),
        };
    }
    if lower.contains("msie ") {
        return BrowserInfo {
            family: "IE".to_string(),
            version: version_after(ua, lower, "msie ").unwrap_or_default(),
        };
    }
    if lower.contains("trident/") {
        return BrowserInfo {
            family: "IE".to_string(),
            version: version_after(ua, lower, "rv:").unwrap_or_default(),
        };
    }
    BrowserInfo {
        family: UNKNOWN_FAMILY.to_string(),
        version: String::new(),
    }
}

fn windows_version(nt: &str) -> String {
    match nt {
        "10.0" => "10",
        "6.3" => "8.1",
        "6.2" => "8",
        "6.1" => "7",
        "6.0" => "Vista",
        "5.1" | "5.2" => "XP",
        other => other,
    }
    .to_string()
}

fn detect_os(ua: &str, lower: &str) -> OsInfo {
    let os = |family: &str, version: Option<String>| OsInfo {
        family: family.to_string(),
        version: version.unwrap_or_default(),
    };
    if lower.contains("windows nt") {
        let v = version_after(ua, lower, "windows nt ").map(|v| windows_version(&v));
        return os("Windows", v);
    }
    if lower.contains("iphone") || lower.contains("ipad") || lower.contains("ipod") {
        let v = version_after(ua, lower, "iphone os ").or_else(|| version_after(ua, lower, "cpu os "));
        return os("iOS", v);
    }
    if lower.contains("android") {
        return os("Android", version_after(ua, lower, "android "));
    }
    if lower.contains("cros") {
        return os("Chrome OS", None);
    }
    if lower.contains("mac os x") {
        return os("Mac OS X", version_after(ua, lower, "mac os x "));
    }
    if lower.contains("linux") {
        return os("Linux", None);
    }
    os(UNKNOWN_FAMILY, None)
}

fn detect_device(lower: &str, os_family: &str) -> (DeviceInfo, bool, bool) {
    let device = |family: &str, brand: Option<&str>, model: Option<&str>| DeviceInfo {
        family: family.to_string(),
        brand: brand.map(String::from),
        model: model.map(String::from),
    };
    if ["bot", "spider", "crawl"].iter().any(|t| lower.contains(t)) {
        return (device("Spider", None, None), false, false);
    }
    if lower.contains("ipad") {
        return (device("iPad", Some("Apple"), Some("iPad")), false, true);
    }
    if lower.contains("iphone") {
        return (device("iPhone", Some("Apple"), Some("iPhone")), true, false);
    }
    if lower.contains("ipod") {
        return (device("iPod", Some("Apple"), Some("iPod")), true, false);
    }
    if os_family == "Android" {
        return if lower.contains("mobile") {
            (device("Generic Smartphone", Some("Generic"), Some("Smartphone")), true, false)
        } else {
            (device("Generic Tablet", Some("Generic"), Some("Tablet")), false, true)
        };
    }
    (device(UNKNOWN_FAMILY, None, None), false, false)
}
