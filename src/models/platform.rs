use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform identifier used as the dispatch key in the adapter registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Bilibili,
    Kwai,
    Youtube,
    WxGzh,
    Facebook,
    Instagram,
    Threads,
    Tiktok,
    Twitter,
    Pinterest,
    Linkedin,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bilibili => "bilibili",
            Self::Kwai => "kwai",
            Self::Youtube => "youtube",
            Self::WxGzh => "wx_gzh",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Threads => "threads",
            Self::Tiktok => "tiktok",
            Self::Twitter => "twitter",
            Self::Pinterest => "pinterest",
            Self::Linkedin => "linkedin",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bilibili" => Ok(Self::Bilibili),
            "kwai" => Ok(Self::Kwai),
            "youtube" => Ok(Self::Youtube),
            "wx_gzh" => Ok(Self::WxGzh),
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            "threads" => Ok(Self::Threads),
            "tiktok" => Ok(Self::Tiktok),
            "twitter" => Ok(Self::Twitter),
            "pinterest" => Ok(Self::Pinterest),
            "linkedin" => Ok(Self::Linkedin),
            _ => Err(format!("Invalid platform: {s}")),
        }
    }
}
