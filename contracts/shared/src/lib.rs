//! Team enumeration shared by the survivor pool, its results oracle, and
//! front ends that render picks.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::contracttype;

/// Number of teams a player can pick from.
pub const TEAM_COUNT: u32 = 32;

/// Team codes in slot order (alphabetical by full team name).
pub const TEAM_CODES: [&str; TEAM_COUNT as usize] = [
    "ARI", // Arizona Cardinals
    "ATL", // Atlanta Falcons
    "BAL", // Baltimore Ravens
    "BUF", // Buffalo Bills
    "CAR", // Carolina Panthers
    "CHI", // Chicago Bears
    "CIN", // Cincinnati Bengals
    "CLE", // Cleveland Browns
    "DAL", // Dallas Cowboys
    "DEN", // Denver Broncos
    "DET", // Detroit Lions
    "GB",  // Green Bay Packers
    "HOU", // Houston Texans
    "IND", // Indianapolis Colts
    "JAX", // Jacksonville Jaguars
    "KC",  // Kansas City Chiefs
    "LAC", // Los Angeles Chargers
    "LA",  // Los Angeles Rams
    "MIA", // Miami Dolphins
    "MIN", // Minnesota Vikings
    "NE",  // New England Patriots
    "NO",  // New Orleans Saints
    "NYG", // New York Giants
    "NYJ", // New York Jets
    "OAK", // Oakland Raiders
    "PHI", // Philadelphia Eagles
    "PIT", // Pittsburgh Steelers
    "SEA", // Seattle Seahawks
    "SF",  // San Francisco 49ers
    "TB",  // Tampa Bay Buccaneers
    "TEN", // Tennessee Titans
    "WAS", // Washington
];

/// How team indices are numbered on the wire.
///
/// Slots are always `0..TEAM_COUNT` internally; the numbering only decides
/// which external index maps to slot 0.
#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum TeamNumbering {
    /// Teams are `0..=31`.
    ZeroBased = 0,
    /// Teams are `1..=32`.
    OneBased = 1,
}

impl TeamNumbering {
    /// Lowest valid team index.
    pub fn first(self) -> u32 {
        match self {
            TeamNumbering::ZeroBased => 0,
            TeamNumbering::OneBased => 1,
        }
    }

    /// Highest valid team index.
    pub fn last(self) -> u32 {
        self.first() + TEAM_COUNT - 1
    }

    /// Internal slot for an external team index, or `None` if out of range.
    pub fn slot(self, team: u32) -> Option<u32> {
        let slot = team.checked_sub(self.first())?;
        if slot < TEAM_COUNT {
            Some(slot)
        } else {
            None
        }
    }

    /// External team index for an internal slot.
    pub fn team(self, slot: u32) -> Option<u32> {
        if slot < TEAM_COUNT {
            Some(self.first() + slot)
        } else {
            None
        }
    }

    pub fn code(self, team: u32) -> Option<&'static str> {
        self.slot(team).map(|slot| TEAM_CODES[slot as usize])
    }
}

/// Bit for `slot` inside a team mask, or `None` if `slot` is out of range.
pub fn team_bit(slot: u32) -> Option<u32> {
    if slot < TEAM_COUNT {
        1u32.checked_shl(slot)
    } else {
        None
    }
}

/// Whether `slot` is set in `mask`.
pub fn mask_contains(mask: u32, slot: u32) -> bool {
    team_bit(slot).map_or(false, |bit| mask & bit != 0)
}
