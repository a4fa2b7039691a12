use std::fmt;

/// Identifier for a logical server resource in the query cache.
///
/// Two operations that affect the same server resource must invalidate the
/// same key, so keys are a closed enum rather than free-form strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// The browsable plant catalog (`/plants`).
    Plants,
    /// One catalog plant by id (`/plants/{id}`).
    Plant(String),
    /// The disease catalog (`/diseases`).
    Diseases,
    /// The user's owned plants (`/my-plants`).
    MyPlants,
    /// Upcoming watering/fertilizing tasks (`/plant-care/upcoming-tasks`).
    UpcomingTasks,
    /// The user's notification preferences (`/users/notification-preferences`).
    NotificationPreferences,
}

impl QueryKey {
    /// Keys that only make sense for a signed-in user. These must not fetch
    /// while the session is logged out; they resolve to `Idle` instead.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            QueryKey::MyPlants | QueryKey::UpcomingTasks | QueryKey::NotificationPreferences
        )
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Plants => write!(f, "plants"),
            QueryKey::Plant(id) => write!(f, "plants/{}", id),
            QueryKey::Diseases => write!(f, "diseases"),
            QueryKey::MyPlants => write!(f, "my-plants"),
            QueryKey::UpcomingTasks => write!(f, "upcoming-tasks"),
            QueryKey::NotificationPreferences => write!(f, "notification-preferences"),
        }
    }
}
