//! Schemas shared by the editor integration tests.

#![allow(dead_code)]

use std::rc::Rc;
use structdoc_editor::{Clipboard, Document, Schema};

pub const CHARACTER_SCHEMA: &str = r#"
<Definitions>
  <StructDef Name="Sword">
    <Number Name="Damage" Default="5" Min="0" Max="100" Type="INT" />
  </StructDef>
  <StructDef Name="Axe">
    <Number Name="Damage" Default="8" Min="0" Max="100" Type="INT" />
  </StructDef>
  <Struct Name="Character">
    <String Name="Title" Default="Hero" />
    <Number Name="Level" Default="1" Min="1" Max="99" Type="INT" />
    <String Name="Label" Default="veteran" VisibleIf="Level>10" />
    <Boolean Name="Active" Default="true" />
    <Colour Name="Tint" Default="255,0,0,255" />
    <Enum Name="Class" EnumValues="Warrior, Mage" />
    <Pair Name="Tag" Key="mood" Default="calm" />
    <Reference Name="Weapon" Keys="Sword, Axe" />
    <Collection Name="Spells" MinCount="1" MaxCount="3">
      <String Name="Spell" Default="Fireball" />
    </Collection>
    <Tree Name="Dialogue">
      <String Name="Line" />
      <Number Name="Pause" />
    </Tree>
    <Attributes>
      <String Name="Name" Default="Unnamed" />
    </Attributes>
  </Struct>
</Definitions>
"#;

pub const MACHINE_SCHEMA: &str = r#"
<Definitions>
  <GraphStructDef Name="State">
    <String Name="Label" Default="idle" />
    <GraphReference Name="Next" Keys="State" />
  </GraphStructDef>
  <GraphStruct Name="Machine" AllowCircularLinks="true">
    <GraphReference Name="Start" Keys="State" />
    <GraphReference Name="Fallback" Keys="State" />
  </GraphStruct>
</Definitions>
"#;

pub fn character_schema() -> Rc<Schema> {
    Rc::new(Schema::parse(CHARACTER_SCHEMA).expect("character schema parses"))
}

pub fn machine_schema() -> Rc<Schema> {
    Rc::new(Schema::parse(MACHINE_SCHEMA).expect("machine schema parses"))
}

pub fn new_character() -> Document {
    Document::new(character_schema(), None)
        .expect("default document")
        .with_clipboard(Clipboard::new())
}

pub fn load_character(source: &str) -> Document {
    Document::load(character_schema(), source)
        .expect("document loads")
        .with_clipboard(Clipboard::new())
}

pub fn new_machine() -> Document {
    Document::new(machine_schema(), None).expect("default machine")
}
