//! HTML rendering of outbound messages.

use crate::{
    catalog::ContentItem,
    texts::{self, TextKey},
    user::{Language, SkipDays, User},
};

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one content item as a daily message.
pub fn format_item(item: &ContentItem) -> String {
    let mut out = format!(
        "<b>{}</b>\n\n{}",
        escape_html(&item.title),
        escape_html(&item.body)
    );
    if let Some(tip) = &item.tip {
        out.push_str(&format!("\n\n💡 <i>{}</i>", escape_html(tip)));
    }
    out
}

pub fn format_skip_days(skip_days: &SkipDays, lang: Language) -> String {
    if skip_days.is_empty() {
        return texts::text(lang, TextKey::NoSkipDays).to_string();
    }
    skip_days
        .iter()
        .map(|d| texts::day_abbrev(lang, d))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Settings summary shown by `/settings` and at registration completion.
pub fn format_settings(user: &User) -> String {
    format!(
        "🕐 {}\n🌍 {}\n📅 {}",
        user.send_time,
        user.timezone.name(),
        format_skip_days(&user.skip_days, user.language)
    )
}

pub fn format_setup_complete(user: &User) -> String {
    let headline = match user.language {
        Language::En => "🎉 <b>Setup complete!</b>",
        Language::Ru => "🎉 <b>Настройка завершена!</b>",
        Language::Uz => "🎉 <b>Sozlash yakunlandi!</b>",
        Language::Kz => "🎉 <b>Баптау аяқталды!</b>",
    };
    format!("{headline}\n\n{}", format_settings(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;

    #[test]
    fn escapes_html_meta_characters() {
        assert_eq!(escape_html("a<b> & c"), "a&lt;b&gt; &amp; c");
    }

    #[test]
    fn item_rendering_includes_tip_when_present() {
        let item = ContentItem {
            id: 1,
            title: "Patience".into(),
            body: "Breathe.".into(),
            tip: Some("Start <small>.".into()),
            image: None,
        };
        let html = format_item(&item);
        assert!(html.contains("<b>Patience</b>"));
        assert!(html.contains("&lt;small&gt;"));

        let bare = ContentItem {
            tip: None,
            ..item.clone()
        };
        assert!(!format_item(&bare).contains("💡"));
    }

    #[test]
    fn skip_day_summary() {
        let user = User {
            chat_id: ChatId(1),
            language: Language::Ru,
            timezone: chrono_tz::Europe::Moscow,
            send_time: "08:00".parse().unwrap(),
            skip_days: SkipDays::weekends(),
            active: true,
            last_delivered: None,
        };
        let summary = format_settings(&user);
        assert!(summary.contains("08:00"));
        assert!(summary.contains("Europe/Moscow"));
        assert!(summary.contains("Сб, Вс"));
    }
}
