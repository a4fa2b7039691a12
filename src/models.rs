use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated user's profile.
/// The server is the source of truth; every successful mutation response
/// replaces the local copy wholesale (never merged field by field).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
}

/// Notification preference flags.
///
/// The reminder flags depend on `push_enabled`: a reminder can only be on
/// while push is on. `apply` enforces that rule when computing the next
/// value for a toggle, before anything is sent to the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub push_enabled: bool,
    pub watering_reminders: bool,
    pub fertilizing_reminders: bool,
    pub email_notifications: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            push_enabled: true,
            watering_reminders: true,
            fertilizing_reminders: false,
            email_notifications: true,
        }
    }
}

/// A single preference flag change requested by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceToggle {
    PushEnabled(bool),
    WateringReminders(bool),
    FertilizingReminders(bool),
    EmailNotifications(bool),
}

impl NotificationPreferences {
    /// Compute the preference set after applying one toggle, enforcing the
    /// dependency rule between push and the reminder flags:
    /// - enabling a reminder switches push on,
    /// - disabling push switches both reminders off.
    pub fn apply(mut self, toggle: PreferenceToggle) -> Self {
        match toggle {
            PreferenceToggle::PushEnabled(false) => {
                self.push_enabled = false;
                self.watering_reminders = false;
                self.fertilizing_reminders = false;
            }
            PreferenceToggle::PushEnabled(true) => {
                self.push_enabled = true;
            }
            PreferenceToggle::WateringReminders(on) => {
                self.watering_reminders = on;
                if on {
                    self.push_enabled = true;
                }
            }
            PreferenceToggle::FertilizingReminders(on) => {
                self.fertilizing_reminders = on;
                if on {
                    self.push_enabled = true;
                }
            }
            PreferenceToggle::EmailNotifications(on) => {
                self.email_notifications = on;
            }
        }
        self
    }

    /// Whether the flags satisfy the dependency rule.
    pub fn is_consistent(&self) -> bool {
        self.push_enabled || (!self.watering_reminders && !self.fertilizing_reminders)
    }
}

/// A plant species in the browsable catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub watering_interval_days: Option<u32>,
    #[serde(default)]
    pub fertilizing_interval_days: Option<u32>,
    #[serde(default)]
    pub sunlight: Option<String>,
}

/// A plant disease entry from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Disease {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A plant the user owns and tracks care for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnedPlant {
    pub id: String,
    pub plant_id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub watering_interval_days: Option<u32>,
    #[serde(default)]
    pub fertilizing_interval_days: Option<u32>,
    #[serde(default)]
    pub last_watered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_fertilized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_watering_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_fertilizing_at: Option<DateTime<Utc>>,
}

/// Request body for adding a plant to the user's collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewOwnedPlant {
    pub plant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The kind of care action a task asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CareAction {
    Water,
    Fertilize,
}

/// An upcoming watering/fertilizing task for an owned plant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CareTask {
    pub my_plant_id: String,
    pub plant_name: String,
    pub action: CareAction,
    pub due_at: DateTime<Utc>,
}

/// One ranked result from the ML identification service.
/// The service spells the label either `class_name` or `class` depending on
/// the model version; both parse into `class_name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentificationMatch {
    #[serde(alias = "class")]
    pub class_name: String,
    pub confidence: f64,
}

/// Fields a profile update may change. Only the present fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }
}
