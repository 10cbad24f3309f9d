//! Entity fixtures shared by the unit tests

use crate::data::{DataType, Value};
use crate::entity::{Entity, EntityInfo, FieldInfo, FieldSet, MigrationInfo, MigrationStep, Persistable, Shared};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rank {
    #[default]
    Member = 0,
    Admin = 1,
}

impl Persistable for Rank {
    const DATA_TYPE: DataType = DataType::Enumeration;

    fn to_value(&self) -> Value {
        Value::Enumeration(*self as i32)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value.as_i64()? {
            0 => Some(Rank::Member),
            1 => Some(Rank::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Entity for Location {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "location").contained()
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("world"), |l| l.world.clone(), |l, v| l.world = v)
            .scalar(FieldInfo::new("x"), |l| l.x, |l, v| l.x = v)
            .scalar(FieldInfo::new("y"), |l| l.y, |l, v| l.y = v)
            .scalar(FieldInfo::new("z"), |l| l.z, |l, v| l.z = v);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Player {
    pub name: String,
    pub level: i32,
    pub rank: Rank,
    pub joined: Option<DateTime<Utc>>,
    pub location: Option<Location>,
}

impl Entity for Player {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "player")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("name").id(), |p| p.name.clone(), |p, v| p.name = v)
            .scalar(FieldInfo::new("level"), |p| p.level, |p, v| p.level = v)
            .scalar(FieldInfo::new("rank"), |p| p.rank, |p, v| p.rank = v)
            .scalar(FieldInfo::new("joined"), |p| p.joined, |p, v| p.joined = v)
            .contained(FieldInfo::new("location"), |p| &p.location, |p| &mut p.location);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Note {
    pub id: i32,
    pub text: String,
}

impl Entity for Note {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "Note")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id().autogenerated(), |n| n.id, |n, v| n.id = v)
            .scalar(FieldInfo::new("text"), |n| n.text.clone(), |n, v| n.text = v);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginData {
    pub id: String,
    pub version: String,
}

impl Entity for PluginData {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("global", "plugin")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |p| p.id.clone(), |p, v| p.id = v)
            .scalar(FieldInfo::new("version"), |p| p.version.clone(), |p, v| p.version = v);
    }
}

/// Entity with a scalar list, stored in `EntityTags`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tagged {
    pub id: String,
    pub tags: Vec<String>,
}

impl Entity for Tagged {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "Entity")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |t| t.id.clone(), |t, v| t.id = v)
            .list(FieldInfo::new("tags"), |t| &t.tags, |t| &mut t.tags);
    }
}

#[derive(Debug, Default)]
pub struct Author {
    pub id: String,
    pub favorite: Option<Shared<Book>>,
}

impl Entity for Author {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("library", "author")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |a| a.id.clone(), |a, v| a.id = v)
            .reference(FieldInfo::new("favorite"), |a| &a.favorite, |a| &mut a.favorite);
    }
}

#[derive(Debug, Default)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: Option<Shared<Author>>,
}

impl Entity for Book {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("library", "book")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |b| b.id.clone(), |b, v| b.id = v)
            .scalar(FieldInfo::new("title"), |b| b.title.clone(), |b, v| b.title = v)
            .reference(FieldInfo::new("author"), |b| &b.author, |b| &mut b.author);
    }
}

#[derive(Debug, Default)]
pub struct Group {
    pub id: i32,
    pub owner: Option<Shared<Player>>,
    pub members: Vec<Shared<Player>>,
    pub ranks: Vec<Rank>,
    pub homes: Vec<Location>,
}

impl Entity for Group {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "Group")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |g| g.id, |g, v| g.id = v)
            .reference(FieldInfo::new("owner"), |g| &g.owner, |g| &mut g.owner)
            .reference_list(FieldInfo::new("members"), |g| &g.members, |g| &mut g.members)
            .list(FieldInfo::new("ranks"), |g| &g.ranks, |g| &mut g.ranks)
            .contained_list(FieldInfo::new("homes"), |g| &g.homes, |g| &mut g.homes);
    }
}

/// Keyed by the player it describes.
#[derive(Debug, Default)]
pub struct Profile {
    pub player: Option<Shared<Player>>,
    pub bio: String,
}

impl Entity for Profile {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "profile")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .reference(FieldInfo::new("player").id(), |p| &p.player, |p| &mut p.player)
            .scalar(FieldInfo::new("bio"), |p| p.bio.clone(), |p, v| p.bio = v);
    }
}

/// Pins profiles, which are themselves keyed by a reference.
#[derive(Debug, Default)]
pub struct Board {
    pub id: i32,
    pub pinned: Vec<Shared<Profile>>,
}

impl Entity for Board {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "board")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |b| b.id, |b, v| b.id = v)
            .reference_list(FieldInfo::new("pinned"), |b| &b.pinned, |b| &mut b.pinned);
    }
}

/// Three revisions of one `widget` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetV1 {
    pub id: String,
    pub name: String,
}

impl Entity for WidgetV1 {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "widget")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |w| w.id.clone(), |w, v| w.id = v)
            .scalar(FieldInfo::new("name"), |w| w.name.clone(), |w, v| w.name = v);
    }
}

/// Adds a column without migration steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetV2 {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

impl Entity for WidgetV2 {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "widget")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |w| w.id.clone(), |w, v| w.id = v)
            .scalar(FieldInfo::new("name"), |w| w.name.clone(), |w, v| w.name = v)
            .scalar(FieldInfo::new("color"), |w| w.color.clone(), |w, v| w.color = v);
    }
}

/// Adds a column through an explicit statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetV3 {
    pub id: String,
    pub name: String,
    pub size: Option<i32>,
}

impl Entity for WidgetV3 {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "widget")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |w| w.id.clone(), |w, v| w.id = v)
            .scalar(FieldInfo::new("name"), |w| w.name.clone(), |w, v| w.name = v)
            .scalar(FieldInfo::new("size"), |w| w.size, |w, v| w.size = v);
    }

    fn migration() -> Option<MigrationInfo> {
        Some(MigrationInfo::new().step(
            MigrationStep::statement(1, "ALTER TABLE \"widget\" ADD COLUMN \"size\" INTEGER").plugin_version("1.1"),
        ))
    }
}

#[derive(Debug, Default)]
pub struct NoId {
    pub value: String,
}

impl Entity for NoId {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "noid")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields.scalar(FieldInfo::new("value"), |n| n.value.clone(), |n, v| n.value = v);
    }
}

#[derive(Debug, Default)]
pub struct TwoIds {
    pub a: String,
    pub b: String,
}

impl Entity for TwoIds {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "twoids")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("a").id(), |t| t.a.clone(), |t, v| t.a = v)
            .scalar(FieldInfo::new("b").id(), |t| t.b.clone(), |t, v| t.b = v);
    }
}

#[derive(Debug, Default)]
pub struct TextAutoId {
    pub id: String,
}

impl Entity for TextAutoId {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "textauto")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields.scalar(FieldInfo::new("id").id().autogenerated(), |t| t.id.clone(), |t, v| t.id = v);
    }
}

/// References a contained-only type.
#[derive(Debug, Default)]
pub struct Waypoint {
    pub id: String,
    pub target: Option<Shared<Location>>,
}

impl Entity for Waypoint {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "waypoint")
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields
            .scalar(FieldInfo::new("id").id(), |w| w.id.clone(), |w, v| w.id = v)
            .reference(FieldInfo::new("target"), |w| &w.target, |w| &mut w.target);
    }
}

#[derive(Debug, Default)]
pub struct Transient {
    pub id: String,
}

impl Entity for Transient {
    fn entity_info() -> EntityInfo {
        EntityInfo::new("test", "transient").uncached()
    }

    fn describe(fields: &mut FieldSet<Self>) {
        fields.scalar(FieldInfo::new("id").id(), |t| t.id.clone(), |t, v| t.id = v);
    }
}
