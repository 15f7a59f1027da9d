//! Load → save → load must preserve every item kind.

mod common;

use common::{character_schema, load_character, new_character};
use structdoc_editor::{Document, ItemValue, LoadOptions, SaveOptions};

const FULL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Character Name="Ayla">
  <Title>Knight &amp; Squire</Title>
  <Level>12</Level>
  <Label>veteran</Label>
  <Active>false</Active>
  <Tint>0,128,255,255</Tint>
  <Class>Mage</Class>
  <Tag Key="mood">stern</Tag>
  <Weapon RefKey="Axe">
    <Damage>9</Damage>
  </Weapon>
  <Spells>
    <Spell>Frost</Spell>
    <!-- favourite -->
    <Spell>Spark</Spell>
  </Spells>
  <Dialogue>
    <Line>Hello</Line>
    <Pause>2</Pause>
  </Dialogue>
</Character>
"#;

#[test]
fn test_every_kind_survives_a_round_trip() {
    let doc = load_character(FULL);
    let saved = doc.save().unwrap();

    for fragment in [
        r#"<Character Name="Ayla">"#,
        "<Title>Knight &amp; Squire</Title>",
        "<Level>12</Level>",
        "<Label>veteran</Label>",
        "<Active>false</Active>",
        "<Tint>0,128,255,255</Tint>",
        "<Class>Mage</Class>",
        r#"<Tag Key="mood">stern</Tag>"#,
        r#"<Weapon RefKey="Axe">"#,
        "<Damage>9</Damage>",
        "<Spell>Frost</Spell>",
        "<!-- favourite -->",
        "<Line>Hello</Line>",
        "<Pause>2</Pause>",
    ] {
        assert!(saved.contains(fragment), "missing {fragment} in\n{saved}");
    }

    let again = Document::load(character_schema(), &saved).unwrap().save().unwrap();
    assert_eq!(saved, again);
}

#[test]
fn test_loaded_values_are_typed() {
    let doc = load_character(FULL);
    let level = doc.find("Level").unwrap();
    assert_eq!(doc.item(level).value(), &ItemValue::Number(12.0));

    let damage = doc.find("Weapon/Damage").unwrap();
    assert_eq!(doc.item(damage).value(), &ItemValue::Number(9.0));

    let spells = doc.find("Spells").unwrap();
    assert_eq!(doc.item(spells).children().len(), 3);
    assert_eq!(doc.description(spells), "Frost, favourite, Spark");
}

#[test]
fn test_out_of_range_values_are_clamped_on_load() {
    let doc = load_character(
        r#"<Character><Level>150</Level><Active>maybe</Active></Character>"#,
    );
    let level = doc.find("Level").unwrap();
    assert_eq!(doc.value_text(level).as_deref(), Some("99"));

    let active = doc.find("Active").unwrap();
    assert_eq!(doc.item(active).value(), &ItemValue::Boolean(true));
}

#[test]
fn test_missing_elements_take_defaults() {
    let doc = load_character("<Character />");
    let title = doc.find("Title").unwrap();
    assert_eq!(doc.value_text(title).as_deref(), Some("Hero"));

    // Absent collections are created fresh, MinCount included
    let spells = doc.find("Spells").unwrap();
    assert_eq!(doc.item(spells).children().len(), 1);
    assert_eq!(doc.description(spells), "Fireball");
}

#[test]
fn test_hidden_items_are_not_saved() {
    let doc = new_character();
    let label = doc.find("Label").unwrap();
    assert!(!doc.is_visible(label));

    let saved = doc.save().unwrap();
    assert!(!saved.contains("<Label>"), "{saved}");
    assert!(saved.contains("<Spell>Fireball</Spell>"), "{saved}");
}

#[test]
fn test_unknown_root_is_an_error() {
    let err = Document::load(character_schema(), "<Monster />").unwrap_err();
    assert!(err.to_string().contains("Monster"), "{err}");
}

#[test]
fn test_array_mode_writes_entries_inline() {
    let mut doc = new_character();
    let spells = doc.find("Spells").unwrap();
    let options = SaveOptions {
        array_mode: true,
        ..SaveOptions::default()
    };

    let single = doc.save_with(&options).unwrap();
    assert!(single.contains(r#"<Spells json:Array="true">Fireball</Spells>"#), "{single}");
    assert!(single.contains("xmlns:json="), "{single}");

    doc.add_new(spells, None).unwrap();
    let entry = doc.find("Spells/1").unwrap();
    doc.set_text(entry, "Blizzard").unwrap();
    let saved = doc.save_with(&options).unwrap();
    assert!(saved.contains("<Spells>Fireball</Spells>"), "{saved}");
    assert!(saved.contains("<Spells>Blizzard</Spells>"), "{saved}");
    assert!(!saved.contains("json:Array"), "{saved}");

    let reloaded = Document::load_with(
        character_schema(),
        &saved,
        LoadOptions { array_mode: true },
    )
    .unwrap();
    let spells = reloaded.find("Spells").unwrap();
    assert_eq!(reloaded.description(spells), "Fireball, Blizzard");
}

#[test]
fn test_malformed_markup_is_reported() {
    assert!(Document::load(character_schema(), "<Character><Title></Character>").is_err());
}

#[test]
fn test_created_document_reloads_unchanged() {
    let doc = new_character();
    let saved = doc.save().unwrap();

    let reloaded = Document::load(character_schema(), &saved).unwrap();
    assert_eq!(reloaded.save().unwrap(), saved);
    for path in ["Title", "Level", "Active", "Tint", "Tag", "Spells/0"] {
        let original = doc.value_text(doc.find(path).unwrap());
        let loaded = reloaded.value_text(reloaded.find(path).unwrap());
        assert_eq!(loaded, original, "{path}");
    }
    let spells = reloaded.find("Spells").unwrap();
    assert_eq!(reloaded.item(spells).children().len(), 1);
}
