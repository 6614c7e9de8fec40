//! Decoded behavior directives and the closed action vocabulary.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed vocabulary of behavior actions the parser may emit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Hold position and keep watch.
    WaitHere,
    /// Walk behind the player.
    FollowPlayer,
    /// Switch to a ranged firearm.
    EquipGun,
    /// Switch to a close-combat weapon.
    EquipMelee,
    /// Switch to a bow or crossbow.
    EquipBow,
    /// Scan the surroundings.
    LookAround,
    /// No behavior change.
    Idle,
}

impl Action {
    /// Every action, in declaration order.
    ///
    /// The lenient parser scans for tokens in this order, so earlier entries
    /// win when several appear in the same text.
    pub const ALL: [Self; 7] = [
        Self::WaitHere,
        Self::FollowPlayer,
        Self::EquipGun,
        Self::EquipMelee,
        Self::EquipBow,
        Self::LookAround,
        Self::Idle,
    ];

    /// Wire token for this action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitHere => "wait_here",
            Self::FollowPlayer => "follow_player",
            Self::EquipGun => "equip_gun",
            Self::EquipMelee => "equip_melee",
            Self::EquipBow => "equip_bow",
            Self::LookAround => "look_around",
            Self::Idle => "idle",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == token)
            .ok_or_else(|| format!("unknown action token `{token}`"))
    }
}

/// Speech, actions, and optional targets decoded from one model reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedDirective {
    /// Line the character says.
    pub speech: String,
    /// One to three actions, in the order the model listed them.
    pub actions: Vec<Action>,
    /// Creature token the character should attack.
    pub attack_target: Option<String>,
    /// Item names the character should pick up.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pickup_targets: Vec<String>,
}
