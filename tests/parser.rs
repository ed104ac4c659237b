use vocal_reminders::intent::compiler::{compile, Placeholder};
use vocal_reminders::intent::locale::LocaleTable;
use vocal_reminders::intent::{IntentParser, ParseError, ReminderIntent};

fn fill(template: &str, user: &str, action: &str, time: &str) -> String {
    template
        .replace("[user]", user)
        .replace("[action]", action)
        .replace("[time]", time)
}

fn sample_values(locale: &str) -> (&'static str, &'static str, &'static str) {
    match locale {
        "fr" => ("Alice", "arroser les plantes", "midi"),
        _ => ("Alice", "water plants", "noon"),
    }
}

#[test]
fn every_builtin_template_round_trips() {
    let table = LocaleTable::builtin();
    for locale in table.locales() {
        let pattern = table.get(locale).unwrap();
        let parser = IntentParser::new(&table, locale).unwrap();
        let (user, action, time) = sample_values(locale);

        for template in &pattern.patterns {
            let phrase = fill(template, user, action, time);
            let intent = parser
                .parse(&phrase)
                .unwrap_or_else(|e| panic!("{locale}: {phrase:?} failed: {e}"));
            assert_eq!(
                intent,
                ReminderIntent {
                    recipients: vec![user.to_string()],
                    action: action.to_string(),
                    time: time.to_string(),
                },
                "{locale}: {template}"
            );
        }
    }
}

#[test]
fn bundled_locale_file_matches_builtin_table() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("data/locales.json");
    let from_file = LocaleTable::load_from_file(&path).unwrap();
    let builtin = LocaleTable::builtin();

    assert_eq!(
        from_file.locales().collect::<Vec<_>>(),
        builtin.locales().collect::<Vec<_>>()
    );
    for locale in builtin.locales() {
        let a = from_file.get(locale).unwrap();
        let b = builtin.get(locale).unwrap();
        assert_eq!(a.patterns, b.patterns);
        assert_eq!(a.placeholders, b.placeholders);
        assert_eq!(a.punctuation, b.punctuation);
        assert_eq!(a.conjunctions, b.conjunctions);
    }
}

#[test]
fn compiling_twice_extracts_identically() {
    let table = LocaleTable::builtin();
    let en = table.get("en").unwrap();
    let inputs = [
        "Remind me to pick up laundry at 5pm today",
        "Remind Alice and Bob to attend the meeting at noon",
        "remind us to go to the opera at 7:15pm",
        "Remind me at noon to stretch",
        "Tell me a joke",
    ];

    for template in &en.patterns {
        let first = compile(en, template).unwrap();
        let second = compile(en, template).unwrap();
        assert_eq!(first.placeholder_order(), second.placeholder_order());
        for input in inputs {
            assert_eq!(first.captures(input), second.captures(input), "{template}: {input}");
        }
    }
}

#[test]
fn placeholder_order_follows_template_text() {
    let table = LocaleTable::builtin();
    let en = table.get("en").unwrap();

    let matcher = compile(en, "Remind [user] at [time] to [action].").unwrap();
    let order = matcher.placeholder_order();
    assert_eq!(order[&Placeholder::User], 0);
    assert_eq!(order[&Placeholder::Time], 1);
    assert_eq!(order[&Placeholder::Action], 2);
}

#[test]
fn reference_phrases_parse() {
    let parser = IntentParser::new(&LocaleTable::builtin(), "en").unwrap();

    assert_eq!(
        parser.parse("Remind me to pick up laundry at 5pm today."),
        Ok(ReminderIntent {
            recipients: vec!["me".into()],
            action: "pick up laundry".into(),
            time: "5pm today".into(),
        })
    );
    assert_eq!(
        parser
            .parse("Remind Alice and Bob to attend the meeting at noon.")
            .unwrap()
            .recipients,
        ["Alice", "Bob"]
    );
    assert_eq!(
        parser.parse("Remind me to call mom at 5pm!"),
        parser.parse("Remind me to call mom at 5pm")
    );
    assert_eq!(parser.parse(""), Err(ParseError::Empty));
    assert_eq!(parser.parse("   "), Err(ParseError::Empty));
    assert!(matches!(
        parser.parse("This is not a reminder at all"),
        Err(ParseError::Unsupported { .. })
    ));
}
