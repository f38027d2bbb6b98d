//! Marker data model.
//!
//! A marker is a point annotation on a floor plan. Positions are stored as
//! percentages of the floor-plan image (`0.0..=100.0` on both axes) so they
//! stay independent of zoom and pan.
//!
//! Partial updates are expressed as an explicit list of [`FieldChange`]s
//! rather than by merging loosely-shaped objects, so every reducer knows
//! exactly which field it touches.

use serde::{Deserialize, Serialize};

use crate::{MarkerId, SyncError};

/// Lower bound of a percentage coordinate.
pub const PERCENT_MIN: f64 = 0.0;
/// Upper bound of a percentage coordinate.
pub const PERCENT_MAX: f64 = 100.0;

/// Clamp a coordinate into `[0, 100]`. NaN maps to 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return PERCENT_MIN;
    }
    value.clamp(PERCENT_MIN, PERCENT_MAX)
}

/// Broad grouping of marker types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerCategory {
    /// Extinguishers, alarms, hose reels, sprinkler valves
    FireEquipment,
    /// Exits, entrances, stairs, elevators
    AccessPoint,
    /// Electrical panels and shutoffs
    Utility,
    /// Hazards and hazardous storage
    Hazard,
    /// First aid and defibrillators
    Medical,
    /// Anything else
    Custom,
}

/// Safety-equipment and location categories a marker can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerType {
    /// Portable fire extinguisher
    FireExtinguisher,
    /// Fire alarm call point
    FireAlarm,
    /// Fire hose reel
    FireHoseReel,
    /// Sprinkler control valve
    SprinklerValve,
    /// Emergency exit
    EmergencyExit,
    /// Building entrance
    Entrance,
    /// Stairwell
    Stairwell,
    /// Elevator
    Elevator,
    /// Electrical distribution panel
    ElectricalPanel,
    /// Gas shutoff valve
    GasShutoff,
    /// Water shutoff valve
    WaterShutoff,
    /// General hazard
    Hazard,
    /// Chemical storage area
    ChemicalStorage,
    /// First aid kit
    FirstAidKit,
    /// Automated external defibrillator
    Aed,
    /// Operator-defined marker
    Custom,
}

impl MarkerType {
    /// The category this type belongs to.
    pub fn category(&self) -> MarkerCategory {
        match self {
            Self::FireExtinguisher | Self::FireAlarm | Self::FireHoseReel | Self::SprinklerValve => {
                MarkerCategory::FireEquipment
            }
            Self::EmergencyExit | Self::Entrance | Self::Stairwell | Self::Elevator => {
                MarkerCategory::AccessPoint
            }
            Self::ElectricalPanel | Self::GasShutoff | Self::WaterShutoff => {
                MarkerCategory::Utility
            }
            Self::Hazard | Self::ChemicalStorage => MarkerCategory::Hazard,
            Self::FirstAidKit | Self::Aed => MarkerCategory::Medical,
            Self::Custom => MarkerCategory::Custom,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FireExtinguisher => "Fire extinguisher",
            Self::FireAlarm => "Fire alarm",
            Self::FireHoseReel => "Fire hose reel",
            Self::SprinklerValve => "Sprinkler valve",
            Self::EmergencyExit => "Emergency exit",
            Self::Entrance => "Entrance",
            Self::Stairwell => "Stairwell",
            Self::Elevator => "Elevator",
            Self::ElectricalPanel => "Electrical panel",
            Self::GasShutoff => "Gas shutoff",
            Self::WaterShutoff => "Water shutoff",
            Self::Hazard => "Hazard",
            Self::ChemicalStorage => "Chemical storage",
            Self::FirstAidKit => "First aid kit",
            Self::Aed => "AED",
            Self::Custom => "Custom",
        }
    }
}

/// A point annotation on a floor plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Stable identifier, unique within the floor plan
    pub id: MarkerId,
    /// What the marker represents
    #[serde(rename = "type")]
    pub marker_type: MarkerType,
    /// Display label (required once confirmed)
    pub name: String,
    /// Horizontal position in percent of the image width
    pub x: f64,
    /// Vertical position in percent of the image height
    pub y: f64,
    /// Optional free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Marker {
    /// Create a marker. Coordinates are clamped into bounds.
    pub fn new(
        id: impl Into<MarkerId>,
        marker_type: MarkerType,
        name: impl Into<String>,
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            id: id.into(),
            marker_type,
            name: name.into(),
            x: clamp_percent(x),
            y: clamp_percent(y),
            description: None,
            notes: None,
        }
    }

    /// Build a marker from a draft under the given id.
    pub fn from_draft(id: MarkerId, draft: MarkerDraft) -> Self {
        Self {
            id,
            marker_type: draft.marker_type,
            name: draft.name,
            x: clamp_percent(draft.x),
            y: clamp_percent(draft.y),
            description: draft.description,
            notes: draft.notes,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Current position as `(x, y)`.
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Check the marker is fit to be persisted.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.name.trim().is_empty() {
            return Err(SyncError::InvalidMarker {
                id: self.id.to_string(),
                reason: "name is empty".into(),
            });
        }
        if !(PERCENT_MIN..=PERCENT_MAX).contains(&self.x)
            || !(PERCENT_MIN..=PERCENT_MAX).contains(&self.y)
        {
            return Err(SyncError::InvalidMarker {
                id: self.id.to_string(),
                reason: format!("position ({}, {}) out of bounds", self.x, self.y),
            });
        }
        Ok(())
    }

    /// Reduce to the shape the persistence endpoint stores.
    pub fn to_key_location(&self) -> KeyLocation {
        KeyLocation {
            marker_type: self.marker_type,
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            description: self.description.clone(),
        }
    }
}

/// A marker that has no id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDraft {
    /// What the marker represents
    #[serde(rename = "type")]
    pub marker_type: MarkerType,
    /// Display label
    pub name: String,
    /// Horizontal position in percent
    pub x: f64,
    /// Vertical position in percent
    pub y: f64,
    /// Optional free text
    #[serde(default)]
    pub description: Option<String>,
    /// Optional free text
    #[serde(default)]
    pub notes: Option<String>,
}

impl MarkerDraft {
    /// Create a draft at the given position.
    pub fn new(marker_type: MarkerType, name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            marker_type,
            name: name.into(),
            x,
            y,
            description: None,
            notes: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// The enumerated set of marker fields an update can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerField {
    /// `type`
    Type,
    /// `name`
    Name,
    /// `x`
    X,
    /// `y`
    Y,
    /// `description`
    Description,
    /// `notes`
    Notes,
}

impl MarkerField {
    /// Whether this field is part of the marker's position.
    pub fn is_positional(&self) -> bool {
        matches!(self, Self::X | Self::Y)
    }
}

/// A single field assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldChange {
    /// Set `type`
    Type(MarkerType),
    /// Set `name`
    Name(String),
    /// Set `x` (clamped on apply)
    X(f64),
    /// Set `y` (clamped on apply)
    Y(f64),
    /// Set or clear `description`
    Description(Option<String>),
    /// Set or clear `notes`
    Notes(Option<String>),
}

impl FieldChange {
    /// The field this change assigns.
    pub fn field(&self) -> MarkerField {
        match self {
            Self::Type(_) => MarkerField::Type,
            Self::Name(_) => MarkerField::Name,
            Self::X(_) => MarkerField::X,
            Self::Y(_) => MarkerField::Y,
            Self::Description(_) => MarkerField::Description,
            Self::Notes(_) => MarkerField::Notes,
        }
    }

    /// Write this change into `marker`.
    pub fn apply(&self, marker: &mut Marker) {
        match self {
            Self::Type(t) => marker.marker_type = *t,
            Self::Name(n) => marker.name = n.clone(),
            Self::X(x) => marker.x = clamp_percent(*x),
            Self::Y(y) => marker.y = clamp_percent(*y),
            Self::Description(d) => marker.description = d.clone(),
            Self::Notes(n) => marker.notes = n.clone(),
        }
    }

    /// Whether applying this change would alter `marker`.
    pub fn differs_from(&self, marker: &Marker) -> bool {
        match self {
            Self::Type(t) => marker.marker_type != *t,
            Self::Name(n) => marker.name != *n,
            Self::X(x) => marker.x != clamp_percent(*x),
            Self::Y(y) => marker.y != clamp_percent(*y),
            Self::Description(d) => marker.description != *d,
            Self::Notes(n) => marker.notes != *n,
        }
    }
}

/// An ordered set of field assignments for one marker.
///
/// Later changes to the same field win when applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerChanges(Vec<FieldChange>);

impl MarkerChanges {
    /// An empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary field change.
    pub fn with(mut self, change: FieldChange) -> Self {
        self.0.push(change);
        self
    }

    /// Set the marker type.
    pub fn marker_type(self, marker_type: MarkerType) -> Self {
        self.with(FieldChange::Type(marker_type))
    }

    /// Set the name.
    pub fn name(self, name: impl Into<String>) -> Self {
        self.with(FieldChange::Name(name.into()))
    }

    /// Set both coordinates.
    pub fn position(self, x: f64, y: f64) -> Self {
        self.with(FieldChange::X(x)).with(FieldChange::Y(y))
    }

    /// Set the description (`None` clears it).
    pub fn description(self, description: Option<String>) -> Self {
        self.with(FieldChange::Description(description))
    }

    /// Set the notes (`None` clears them).
    pub fn notes(self, notes: Option<String>) -> Self {
        self.with(FieldChange::Notes(notes))
    }

    /// The individual changes, in order.
    pub fn changes(&self) -> &[FieldChange] {
        &self.0
    }

    /// True when no field is assigned.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply every change to `marker`.
    pub fn apply_to(&self, marker: &mut Marker) {
        for change in &self.0 {
            change.apply(marker);
        }
    }

    /// Return a copy of `marker` with every change applied.
    pub fn applied(&self, marker: &Marker) -> Marker {
        let mut next = marker.clone();
        self.apply_to(&mut next);
        next
    }

    /// Whether applying the set would alter `marker`.
    pub fn differs_from(&self, marker: &Marker) -> bool {
        self.applied(marker) != *marker
    }

    /// Fields whose value would change, deduplicated, in first-seen order.
    pub fn differing_fields(&self, marker: &Marker) -> Vec<MarkerField> {
        let after = self.applied(marker);
        let mut fields = Vec::new();
        for change in &self.0 {
            let field = change.field();
            if fields.contains(&field) {
                continue;
            }
            let changed = match field {
                MarkerField::Type => after.marker_type != marker.marker_type,
                MarkerField::Name => after.name != marker.name,
                MarkerField::X => after.x != marker.x,
                MarkerField::Y => after.y != marker.y,
                MarkerField::Description => after.description != marker.description,
                MarkerField::Notes => after.notes != marker.notes,
            };
            if changed {
                fields.push(field);
            }
        }
        fields
    }

    /// Whether the set would move `marker`.
    pub fn touches_position(&self, marker: &Marker) -> bool {
        self.differing_fields(marker)
            .iter()
            .any(MarkerField::is_positional)
    }

    /// A change set that turns any marker into `target` (id excluded).
    pub fn replace_with(target: &Marker) -> Self {
        Self::new()
            .marker_type(target.marker_type)
            .name(target.name.clone())
            .position(target.x, target.y)
            .description(target.description.clone())
            .notes(target.notes.clone())
    }
}

/// Marker shape accepted by the persistence endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyLocation {
    /// What the marker represents
    #[serde(rename = "type")]
    pub marker_type: MarkerType,
    /// Display label
    pub name: String,
    /// Horizontal position in percent
    pub x: f64,
    /// Vertical position in percent
    pub y: f64,
    /// Optional free text
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extinguisher() -> Marker {
        Marker::new("m1", MarkerType::FireExtinguisher, "Lobby", 1.0, 1.0)
    }

    #[test]
    fn clamp_percent_bounds() {
        assert_eq!(clamp_percent(-5.0), 0.0);
        assert_eq!(clamp_percent(150.0), 100.0);
        assert_eq!(clamp_percent(42.5), 42.5);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
    }

    #[test]
    fn new_marker_clamps_position() {
        let marker = Marker::new("m1", MarkerType::Hazard, "Spill", 120.0, -3.0);
        assert_eq!(marker.position(), (100.0, 0.0));
    }

    #[test]
    fn marker_type_serializes_snake_case() {
        let json = serde_json::to_string(&MarkerType::FireExtinguisher).unwrap();
        assert_eq!(json, "\"fire_extinguisher\"");
        let hazard: MarkerType = serde_json::from_str("\"hazard\"").unwrap();
        assert_eq!(hazard, MarkerType::Hazard);
    }

    #[test]
    fn marker_type_field_is_named_type_on_the_wire() {
        let json = serde_json::to_value(extinguisher()).unwrap();
        assert_eq!(json["type"], "fire_extinguisher");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn categories_cover_the_groups() {
        assert_eq!(MarkerType::Aed.category(), MarkerCategory::Medical);
        assert_eq!(MarkerType::Stairwell.category(), MarkerCategory::AccessPoint);
        assert_eq!(MarkerType::GasShutoff.category(), MarkerCategory::Utility);
        assert_eq!(MarkerType::FireAlarm.category(), MarkerCategory::FireEquipment);
        assert_eq!(MarkerType::ChemicalStorage.category(), MarkerCategory::Hazard);
        assert_eq!(MarkerType::Custom.category(), MarkerCategory::Custom);
    }

    #[test]
    fn validate_rejects_blank_name() {
        let mut marker = extinguisher();
        marker.name = "   ".into();
        assert!(matches!(
            marker.validate(),
            Err(SyncError::InvalidMarker { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_bounds_position() {
        let mut marker = extinguisher();
        marker.x = 101.0;
        assert!(marker.validate().is_err());
        assert!(extinguisher().validate().is_ok());
    }

    #[test]
    fn changes_apply_in_order() {
        let changes = MarkerChanges::new().name("First").name("Second").position(10.0, 20.0);
        let updated = changes.applied(&extinguisher());
        assert_eq!(updated.name, "Second");
        assert_eq!(updated.position(), (10.0, 20.0));
    }

    #[test]
    fn changes_clamp_coordinates() {
        let updated = MarkerChanges::new().position(-1.0, 300.0).applied(&extinguisher());
        assert_eq!(updated.position(), (0.0, 100.0));
    }

    #[test]
    fn description_can_be_cleared() {
        let marker = extinguisher().with_description("by the door");
        let updated = MarkerChanges::new().description(None).applied(&marker);
        assert_eq!(updated.description, None);
    }

    #[test]
    fn identical_values_do_not_differ() {
        let marker = extinguisher();
        let same = MarkerChanges::new().name("Lobby").position(1.0, 1.0);
        assert!(!same.differs_from(&marker));
        assert!(same.differing_fields(&marker).is_empty());
    }

    #[test]
    fn differing_fields_are_deduplicated() {
        let marker = extinguisher();
        let changes = MarkerChanges::new().position(5.0, 1.0).with(FieldChange::X(6.0)).name("B");
        assert_eq!(
            changes.differing_fields(&marker),
            vec![MarkerField::X, MarkerField::Name]
        );
        assert!(changes.touches_position(&marker));
    }

    #[test]
    fn property_only_changes_do_not_touch_position() {
        let changes = MarkerChanges::new().notes(Some("checked".into()));
        assert!(changes.differs_from(&extinguisher()));
        assert!(!changes.touches_position(&extinguisher()));
    }

    #[test]
    fn replace_with_reproduces_target() {
        let target = Marker::new("other", MarkerType::Aed, "Reception", 33.0, 44.0).with_notes("n");
        let result = MarkerChanges::replace_with(&target).applied(&extinguisher());
        assert_eq!(result.id, MarkerId::from("m1"));
        assert_eq!(result.marker_type, MarkerType::Aed);
        assert_eq!(result.position(), (33.0, 44.0));
        assert_eq!(result.notes.as_deref(), Some("n"));
    }

    #[test]
    fn key_location_drops_id_and_notes() {
        let marker = extinguisher().with_description("d").with_notes("n");
        let location = marker.to_key_location();
        let json = serde_json::to_value(&location).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("notes").is_none());
        assert_eq!(json["type"], "fire_extinguisher");
        assert_eq!(json["description"], "d");
    }

    #[test]
    fn draft_becomes_clamped_marker() {
        let draft = MarkerDraft::new(MarkerType::Hazard, "Spill", 50.0, 180.0).with_notes("wet");
        let marker = Marker::from_draft(MarkerId::from("m9"), draft);
        assert_eq!(marker.position(), (50.0, 100.0));
        assert_eq!(marker.notes.as_deref(), Some("wet"));
    }
}
