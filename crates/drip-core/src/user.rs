//! Subscriber model and the schedule-rule value types.

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{domain::ChatId, errors::Error};

/// Languages the catalog and dialog prompts are available in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
    Uz,
    Kz,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
            Language::Uz => "uz",
            Language::Kz => "kz",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "en" => Some(Language::En),
            "ru" => Some(Language::Ru),
            "uz" => Some(Language::Uz),
            "kz" => Some(Language::Kz),
            _ => None,
        }
    }
}

/// Daily send time, local to the user's timezone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SendTime {
    pub hour: u8,
    pub minute: u8,
}

impl FromStr for SendTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::Validation(format!("not an HH:MM time: {s:?}")))?;
        let hour: u8 = h
            .parse()
            .map_err(|_| Error::Validation(format!("bad hour: {h:?}")))?;
        let minute: u8 = m
            .parse()
            .map_err(|_| Error::Validation(format!("bad minute: {m:?}")))?;
        if hour > 23 || minute > 59 {
            return Err(Error::Validation(format!("time out of range: {s:?}")));
        }
        Ok(SendTime { hour, minute })
    }
}

impl fmt::Display for SendTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for SendTime {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}

impl From<SendTime> for String {
    fn from(t: SendTime) -> String {
        t.to_string()
    }
}

/// Weekdays on which delivery is suppressed. Monday = 0 .. Sunday = 6.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct SkipDays(BTreeSet<u8>);

impl SkipDays {
    pub fn empty() -> Self {
        SkipDays(BTreeSet::new())
    }

    pub fn weekends() -> Self {
        SkipDays(BTreeSet::from([5, 6]))
    }

    /// Parse a comma-separated list of day indices, e.g. `"5,6"`.
    pub fn parse_csv(s: &str) -> Result<Self, Error> {
        let mut days = BTreeSet::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let day: u8 = part
                .parse()
                .map_err(|_| Error::Validation(format!("not a day number: {part:?}")))?;
            if day > 6 {
                return Err(Error::Validation(format!("day out of range 0-6: {day}")));
            }
            days.insert(day);
        }
        Ok(SkipDays(days))
    }

    pub fn toggle(&mut self, day: u8) {
        if day > 6 {
            return;
        }
        if !self.0.remove(&day) {
            self.0.insert(day);
        }
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.0.contains(&(weekday.num_days_from_monday() as u8))
    }

    pub fn contains_index(&self, day: u8) -> bool {
        self.0.contains(&day)
    }

    pub fn covers_all_week(&self) -> bool {
        self.0.len() == 7
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }
}

impl TryFrom<Vec<u8>> for SkipDays {
    type Error = Error;
    fn try_from(v: Vec<u8>) -> Result<Self, Error> {
        if let Some(bad) = v.iter().find(|d| **d > 6) {
            return Err(Error::Validation(format!("day out of range 0-6: {bad}")));
        }
        Ok(SkipDays(v.into_iter().collect()))
    }
}

impl From<SkipDays> for Vec<u8> {
    fn from(s: SkipDays) -> Vec<u8> {
        s.0.into_iter().collect()
    }
}

/// A subscriber.
///
/// `active == false` implies no scheduled job exists for this chat; the
/// scheduler and the unsubscribe flow both maintain that invariant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub chat_id: ChatId,
    pub language: Language,
    pub timezone: Tz,
    pub send_time: SendTime,
    #[serde(default)]
    pub skip_days: SkipDays,
    pub active: bool,
    /// Last content item delivered, kept for a "no immediate repeat" policy.
    #[serde(default)]
    pub last_delivered: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_time_parses_and_rejects() {
        let t: SendTime = "08:00".parse().unwrap();
        assert_eq!((t.hour, t.minute), (8, 0));
        assert_eq!(t.to_string(), "08:00");

        let t: SendTime = "6:05".parse().unwrap();
        assert_eq!((t.hour, t.minute), (6, 5));

        assert!("24:00".parse::<SendTime>().is_err());
        assert!("12:60".parse::<SendTime>().is_err());
        assert!("noon".parse::<SendTime>().is_err());
        assert!("12".parse::<SendTime>().is_err());
    }

    #[test]
    fn skip_days_parse_and_toggle() {
        let days = SkipDays::parse_csv("5,6").unwrap();
        assert!(days.contains(Weekday::Sat));
        assert!(days.contains(Weekday::Sun));
        assert!(!days.contains(Weekday::Mon));

        assert!(SkipDays::parse_csv("7").is_err());
        assert!(SkipDays::parse_csv("1,x").is_err());
        assert!(SkipDays::parse_csv("").unwrap().is_empty());

        let mut days = SkipDays::empty();
        days.toggle(3);
        assert!(days.contains(Weekday::Thu));
        days.toggle(3);
        assert!(!days.contains(Weekday::Thu));
    }

    #[test]
    fn skip_days_all_week_detection() {
        let all = SkipDays::parse_csv("0,1,2,3,4,5,6").unwrap();
        assert!(all.covers_all_week());
        assert!(!SkipDays::weekends().covers_all_week());
    }

    #[test]
    fn user_round_trips_through_json() {
        let user = User {
            chat_id: ChatId(42),
            language: Language::Ru,
            timezone: chrono_tz::Europe::Moscow,
            send_time: "08:00".parse().unwrap(),
            skip_days: SkipDays::weekends(),
            active: true,
            last_delivered: Some(3),
        };
        let json = serde_json::to_string(&user).unwrap();
        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
    }
}
