//! Built-in localized strings for the dialog and command surfaces.
//!
//! Kept deliberately small: one key per prompt/confirmation, four languages.
//! Anything parameterized (settings summaries, item rendering) lives in
//! `formatting`.

use crate::user::Language;

/// Shown on `/start`, before a language is known. Bilingual on purpose.
pub const WELCOME: &str = "🕊 <b>Welcome!</b> Every day I send you one short idea to practice, \
at a time you choose.\n\nPlease choose your language / Пожалуйста, выберите язык:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextKey {
    LanguagePrompt,
    LanguageSaved,
    TimezonePrompt,
    InvalidTimezone,
    TimePrompt,
    InvalidTime,
    SkipDaysPrompt,
    InvalidSkipDays,
    AlreadySubscribed,
    NotSubscribed,
    Unsubscribed,
    SettingsMenu,
    SettingsSaved,
    TestPrefix,
    TestUnavailable,
    NoFlowHint,
    BtnChangeLanguage,
    BtnChangeTimezone,
    BtnChangeTime,
    BtnChangeSkipDays,
    BtnWeekends,
    BtnNoSkip,
    BtnDone,
    NoSkipDays,
}

pub fn text(lang: Language, key: TextKey) -> &'static str {
    use Language::*;
    use TextKey::*;
    match (key, lang) {
        (LanguagePrompt, En) => "🌐 Choose your language:",
        (LanguagePrompt, Ru) => "🌐 Выберите язык:",
        (LanguagePrompt, Uz) => "🌐 Tilni tanlang:",
        (LanguagePrompt, Kz) => "🌐 Тілді таңдаңыз:",

        (LanguageSaved, En) => "✅ Language set to English.",
        (LanguageSaved, Ru) => "✅ Язык установлен: русский.",
        (LanguageSaved, Uz) => "✅ Til tanlandi: o'zbek.",
        (LanguageSaved, Kz) => "✅ Тіл таңдалды: қазақ.",

        (TimezonePrompt, En) => {
            "📍 <b>Time zone</b>\nSend your IANA time zone, e.g. <code>Europe/Moscow</code> or <code>UTC</code>."
        }
        (TimezonePrompt, Ru) => {
            "📍 <b>Часовой пояс</b>\nОтправьте часовой пояс в формате IANA, например <code>Europe/Moscow</code> или <code>UTC</code>."
        }
        (TimezonePrompt, Uz) => {
            "📍 <b>Vaqt mintaqasi</b>\nIANA formatida yuboring, masalan <code>Asia/Tashkent</code>."
        }
        (TimezonePrompt, Kz) => {
            "📍 <b>Уақыт белдеуі</b>\nIANA форматында жіберіңіз, мысалы <code>Asia/Almaty</code>."
        }

        (InvalidTimezone, En) => "❌ Unknown time zone. Examples: Europe/Moscow, Asia/Tashkent, UTC.",
        (InvalidTimezone, Ru) => "❌ Неизвестный часовой пояс. Примеры: Europe/Moscow, Asia/Tashkent, UTC.",
        (InvalidTimezone, Uz) => "❌ Noma'lum vaqt mintaqasi. Masalan: Asia/Tashkent, UTC.",
        (InvalidTimezone, Kz) => "❌ Белгісіз уақыт белдеуі. Мысалы: Asia/Almaty, UTC.",

        (TimePrompt, En) => "⏰ <b>Send time</b>\nSend a time as HH:MM, e.g. <code>08:00</code>.",
        (TimePrompt, Ru) => "⏰ <b>Время отправки</b>\nОтправьте время в формате ЧЧ:ММ, например <code>08:00</code>.",
        (TimePrompt, Uz) => "⏰ <b>Yuborish vaqti</b>\nHH:MM formatida yuboring, masalan <code>08:00</code>.",
        (TimePrompt, Kz) => "⏰ <b>Жіберу уақыты</b>\nHH:MM форматында жіберіңіз, мысалы <code>08:00</code>.",

        (InvalidTime, En) => "❌ Invalid time. Use HH:MM, e.g. 08:00.",
        (InvalidTime, Ru) => "❌ Неверное время. Формат ЧЧ:ММ, например 08:00.",
        (InvalidTime, Uz) => "❌ Noto'g'ri vaqt. HH:MM formatida, masalan 08:00.",
        (InvalidTime, Kz) => "❌ Қате уақыт. HH:MM форматында, мысалы 08:00.",

        (SkipDaysPrompt, En) => {
            "📅 <b>Days to skip</b> (optional)\nToggle days below, or send numbers 0-6 separated by commas (0=Mon … 6=Sun), e.g. <code>5,6</code>."
        }
        (SkipDaysPrompt, Ru) => {
            "📅 <b>Дни пропуска</b> (необязательно)\nВыберите дни кнопками или отправьте числа 0-6 через запятую (0=Пн … 6=Вс), например <code>5,6</code>."
        }
        (SkipDaysPrompt, Uz) => {
            "📅 <b>O'tkazib yuboriladigan kunlar</b>\nKunlarni tugmalar bilan tanlang yoki 0-6 raqamlarini vergul bilan yuboring."
        }
        (SkipDaysPrompt, Kz) => {
            "📅 <b>Өткізілетін күндер</b>\nКүндерді түймелермен таңдаңыз немесе 0-6 сандарын үтірмен жіберіңіз."
        }

        (InvalidSkipDays, En) => "❌ Invalid days. Use numbers 0-6 separated by commas.",
        (InvalidSkipDays, Ru) => "❌ Неверный формат. Используйте числа 0-6 через запятую.",
        (InvalidSkipDays, Uz) => "❌ Noto'g'ri format. 0-6 raqamlarini vergul bilan yozing.",
        (InvalidSkipDays, Kz) => "❌ Қате формат. 0-6 сандарын үтірмен жазыңыз.",

        (AlreadySubscribed, En) => "You're already subscribed. Use /settings to change settings or /stop to unsubscribe.",
        (AlreadySubscribed, Ru) => "Вы уже подписаны. /settings — изменить настройки, /stop — отписаться.",
        (AlreadySubscribed, Uz) => "Siz allaqachon obuna bo'lgansiz. /settings — sozlamalar, /stop — obunani bekor qilish.",
        (AlreadySubscribed, Kz) => "Сіз тіркелгенсіз. /settings — баптаулар, /stop — жазылудан бас тарту.",

        (NotSubscribed, En) => "You're not subscribed. Use /start to subscribe.",
        (NotSubscribed, Ru) => "Вы не подписаны. Используйте /start, чтобы подписаться.",
        (NotSubscribed, Uz) => "Siz obuna emassiz. Obuna uchun /start.",
        (NotSubscribed, Kz) => "Сіз жазылмағансыз. Жазылу үшін /start.",

        (Unsubscribed, En) => "😔 You have unsubscribed. Use /start to subscribe again.",
        (Unsubscribed, Ru) => "😔 Вы отписались. Используйте /start, чтобы подписаться снова.",
        (Unsubscribed, Uz) => "😔 Obuna bekor qilindi. Qayta obuna uchun /start.",
        (Unsubscribed, Kz) => "😔 Жазылудан бас тарттыңыз. Қайта жазылу үшін /start.",

        (SettingsMenu, En) => "⚙️ <b>Settings</b>\nWhat would you like to change?",
        (SettingsMenu, Ru) => "⚙️ <b>Настройки</b>\nЧто изменить?",
        (SettingsMenu, Uz) => "⚙️ <b>Sozlamalar</b>\nNimani o'zgartiramiz?",
        (SettingsMenu, Kz) => "⚙️ <b>Баптаулар</b>\nНені өзгертеміз?",

        (SettingsSaved, En) => "✅ Saved.",
        (SettingsSaved, Ru) => "✅ Сохранено.",
        (SettingsSaved, Uz) => "✅ Saqlandi.",
        (SettingsSaved, Kz) => "✅ Сақталды.",

        (TestPrefix, En) => "🧪 <b>Test message</b>",
        (TestPrefix, Ru) => "🧪 <b>Тестовое сообщение</b>",
        (TestPrefix, Uz) => "🧪 <b>Test xabari</b>",
        (TestPrefix, Kz) => "🧪 <b>Тест хабар</b>",

        (TestUnavailable, En) => "Failed to send a test message.",
        (TestUnavailable, Ru) => "Не удалось отправить тестовое сообщение.",
        (TestUnavailable, Uz) => "Test xabarini yuborib bo'lmadi.",
        (TestUnavailable, Kz) => "Тест хабарын жіберу мүмкін болмады.",

        (NoFlowHint, En) => "Use /start to subscribe or /settings to change your settings.",
        (NoFlowHint, Ru) => "Используйте /start для подписки или /settings для настроек.",
        (NoFlowHint, Uz) => "/start — obuna, /settings — sozlamalar.",
        (NoFlowHint, Kz) => "/start — жазылу, /settings — баптаулар.",

        (BtnChangeLanguage, En) => "🌐 Language",
        (BtnChangeLanguage, Ru) => "🌐 Язык",
        (BtnChangeLanguage, Uz) => "🌐 Til",
        (BtnChangeLanguage, Kz) => "🌐 Тіл",

        (BtnChangeTimezone, En) => "🌍 Time zone",
        (BtnChangeTimezone, Ru) => "🌍 Часовой пояс",
        (BtnChangeTimezone, Uz) => "🌍 Vaqt mintaqasi",
        (BtnChangeTimezone, Kz) => "🌍 Уақыт белдеуі",

        (BtnChangeTime, En) => "⏰ Send time",
        (BtnChangeTime, Ru) => "⏰ Время отправки",
        (BtnChangeTime, Uz) => "⏰ Yuborish vaqti",
        (BtnChangeTime, Kz) => "⏰ Жіберу уақыты",

        (BtnChangeSkipDays, En) => "📅 Skip days",
        (BtnChangeSkipDays, Ru) => "📅 Дни пропуска",
        (BtnChangeSkipDays, Uz) => "📅 O'tkazib yuborish kunlari",
        (BtnChangeSkipDays, Kz) => "📅 Өткізілетін күндер",

        (BtnWeekends, En) => "Weekends",
        (BtnWeekends, Ru) => "Выходные",
        (BtnWeekends, Uz) => "Dam olish kunlari",
        (BtnWeekends, Kz) => "Демалыс күндері",

        (BtnNoSkip, En) => "None",
        (BtnNoSkip, Ru) => "Без пропусков",
        (BtnNoSkip, Uz) => "Hech biri",
        (BtnNoSkip, Kz) => "Ешқайсысы",

        (BtnDone, En) => "✅ Done",
        (BtnDone, Ru) => "✅ Готово",
        (BtnDone, Uz) => "✅ Tayyor",
        (BtnDone, Kz) => "✅ Дайын",

        (NoSkipDays, En) => "every day",
        (NoSkipDays, Ru) => "каждый день",
        (NoSkipDays, Uz) => "har kuni",
        (NoSkipDays, Kz) => "күн сайын",
    }
}

/// Short weekday label, Monday = 0 .. Sunday = 6.
pub fn day_abbrev(lang: Language, day: u8) -> &'static str {
    const EN: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    const RU: [&str; 7] = ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];
    const UZ: [&str; 7] = ["Du", "Se", "Ch", "Pa", "Ju", "Sh", "Ya"];
    const KZ: [&str; 7] = ["Дс", "Сс", "Ср", "Бс", "Жм", "Сб", "Жс"];

    let idx = (day as usize).min(6);
    match lang {
        Language::En => EN[idx],
        Language::Ru => RU[idx],
        Language::Uz => UZ[idx],
        Language::Kz => KZ[idx],
    }
}
