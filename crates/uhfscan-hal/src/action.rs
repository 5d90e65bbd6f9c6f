// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logical actions and the static tables mapping them to vendor method names.
//!
//! Each action has an [`ActionRoute`]: the host roles to try (in order), the
//! candidate method names with their argument mapping, and whether the first
//! success wins or every candidate is applied.

use crate::host::HostRole;
use crate::value::HostValue;

/// A reader operation, independent of how a given firmware spells it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalAction {
    StartInventory,
    StopInventory,
    SetPower,
    SetAntiCollisionParam,
    SetDynamicAdaptation,
    SetSession,
    SetTarget,
    SetSignalFilter,
    SetRegionSingleChannel,
    RestoreRegionHopping,
    ReadOneByPop,
    ReadListBatch,
    ReadTextLog,
    ReadRawBuffer,
    PowerOn,
    PowerOff,
    ResetInventory,
    SetContinuousMode,
    RegisterTagCallback,
}

impl LogicalAction {
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            LogicalAction::ReadOneByPop
                | LogicalAction::ReadListBatch
                | LogicalAction::ReadTextLog
                | LogicalAction::ReadRawBuffer
        )
    }
}

/// How candidates of a route are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Stop at the first candidate that succeeds
    FirstSuccess,
    /// Apply every candidate on every host; success if any succeeded
    Broadcast,
    /// Read surface; candidates are drained by the caller
    Drain,
    /// Callback registration; first host accepting the subscription wins
    Subscribe,
}

/// Literal argument baked into a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lit {
    Int(i64),
    Bool(bool),
}

impl From<Lit> for HostValue {
    fn from(lit: Lit) -> Self {
        match lit {
            Lit::Int(v) => HostValue::Int(v),
            Lit::Bool(v) => HostValue::Bool(v),
        }
    }
}

/// Mapping from the action's arguments to a candidate's arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMap {
    /// No arguments
    Empty,
    /// Forward the first argument
    First,
    /// First argument passed twice (read power, write power)
    Duplicate,
    /// First argument coerced to an integer (`true` -> 1)
    FirstAsInt,
    /// Pick arguments by index
    Pick(&'static [usize]),
    /// Fixed literals, ignoring the action's arguments
    Fixed(&'static [Lit]),
}

impl ArgMap {
    /// Build the concrete argument list
    ///
    /// # Returns
    /// `None` when the action did not supply what this mapping needs
    pub fn build(&self, args: &[HostValue]) -> Option<Vec<HostValue>> {
        match self {
            ArgMap::Empty => Some(Vec::new()),
            ArgMap::First => args.first().map(|a| vec![a.clone()]),
            ArgMap::Duplicate => args.first().map(|a| vec![a.clone(), a.clone()]),
            ArgMap::FirstAsInt => args.first().and_then(|a| match a {
                HostValue::Bool(b) => Some(vec![HostValue::Int(*b as i64)]),
                HostValue::Int(_) => Some(vec![a.clone()]),
                _ => None,
            }),
            ArgMap::Pick(indices) => indices.iter().map(|i| args.get(*i).cloned()).collect(),
            ArgMap::Fixed(lits) => Some(lits.iter().map(|l| HostValue::from(*l)).collect()),
        }
    }
}

/// One vendor method that may implement an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub name: &'static str,
    pub args: ArgMap,
}

const fn c(name: &'static str, args: ArgMap) -> Candidate {
    Candidate { name, args }
}

/// Routing entry for a [`LogicalAction`]
#[derive(Debug, Clone, Copy)]
pub struct ActionRoute {
    pub action: LogicalAction,
    pub dispatch: Dispatch,
    /// Host roles in the order they are tried
    pub roles: &'static [HostRole],
    pub candidates: &'static [Candidate],
}

use ArgMap::{Duplicate, Empty, First, FirstAsInt, Fixed, Pick};
use HostRole::{Function, Manager, SerialClient};

const FUNC_MGR: &[HostRole] = &[Function, Manager];
const MGR_FUNC: &[HostRole] = &[Manager, Function];
const FUNC_MGR_SERIAL: &[HostRole] = &[Function, Manager, SerialClient];
const ALL_SERIAL_FIRST: &[HostRole] = &[SerialClient, Manager, Function];

static START: ActionRoute = ActionRoute {
    action: LogicalAction::StartInventory,
    dispatch: Dispatch::FirstSuccess,
    roles: FUNC_MGR,
    candidates: &[
        c("startInventoryTag", Empty),
        c("inventoryStart", Empty),
        c("startRead", Empty),
    ],
};

static STOP: ActionRoute = ActionRoute {
    action: LogicalAction::StopInventory,
    dispatch: Dispatch::Broadcast,
    roles: FUNC_MGR,
    candidates: &[
        c("stopInventory", Empty),
        c("inventoryStop", Empty),
        c("stopRead", Empty),
    ],
};

static SET_POWER: ActionRoute = ActionRoute {
    action: LogicalAction::SetPower,
    dispatch: Dispatch::FirstSuccess,
    roles: FUNC_MGR,
    candidates: &[c("setReadWritePower", Duplicate), c("powerSet", First)],
};

static SET_Q: ActionRoute = ActionRoute {
    action: LogicalAction::SetAntiCollisionParam,
    dispatch: Dispatch::Broadcast,
    roles: FUNC_MGR,
    candidates: &[c("setQ", First), c("SetQValue", First)],
};

static SET_DYNAMIC: ActionRoute = ActionRoute {
    action: LogicalAction::SetDynamicAdaptation,
    dispatch: Dispatch::Broadcast,
    roles: FUNC_MGR,
    candidates: &[c("setDynamicQ", First)],
};

static SET_SESSION: ActionRoute = ActionRoute {
    action: LogicalAction::SetSession,
    dispatch: Dispatch::Broadcast,
    roles: FUNC_MGR,
    candidates: &[c("setSession", First)],
};

static SET_TARGET: ActionRoute = ActionRoute {
    action: LogicalAction::SetTarget,
    dispatch: Dispatch::Broadcast,
    roles: FUNC_MGR,
    candidates: &[c("setTarget", First)],
};

static SET_FILTER: ActionRoute = ActionRoute {
    action: LogicalAction::SetSignalFilter,
    dispatch: Dispatch::Broadcast,
    roles: FUNC_MGR,
    candidates: &[c("setRssiFilter", First), c("setMinRssi", First)],
};

static REGION_SINGLE: ActionRoute = ActionRoute {
    action: LogicalAction::SetRegionSingleChannel,
    dispatch: Dispatch::Broadcast,
    roles: FUNC_MGR,
    candidates: &[
        c("setHopping", Fixed(&[Lit::Bool(false)])),
        c("setRegion", Pick(&[0])),
        c("setFreRegion", Pick(&[0])),
        c("setChannel", Pick(&[1])),
        c("setFrequency", Pick(&[2])),
        c("setUserDefineFrequency", Pick(&[4, 5, 6])),
        c("setFrequencyRegion", Pick(&[7, 8, 9])),
        c("setProfile", Pick(&[3])),
    ],
};

static REGION_RESTORE: ActionRoute = ActionRoute {
    action: LogicalAction::RestoreRegionHopping,
    dispatch: Dispatch::Broadcast,
    roles: FUNC_MGR,
    candidates: &[c("setHopping", Fixed(&[Lit::Bool(true)]))],
};

static READ_POP: ActionRoute = ActionRoute {
    action: LogicalAction::ReadOneByPop,
    dispatch: Dispatch::Drain,
    roles: FUNC_MGR,
    candidates: &[
        c("readTagFromBuffer", Empty),
        c("getTagFromBuffer", Empty),
        c("popTagFromBuffer", Empty),
        c("inventoryReadTagFromBuffer", Empty),
        c("readBufferTag", Empty),
        c("getOneTag", Empty),
        c("readUhfBufferTag", Empty),
        c("readTagFromBufferByOnce", Empty),
        c("getEpcFromBuffer", Empty),
    ],
};

static READ_LIST: ActionRoute = ActionRoute {
    action: LogicalAction::ReadListBatch,
    dispatch: Dispatch::Drain,
    roles: FUNC_MGR,
    candidates: &[
        c("getTagList", Empty),
        c("getTags", Empty),
        c("readBuffer", Empty),
        c("getInventoryTagList", Empty),
        c("getInventoryTag", Empty),
        c("inventoryBuffer", Empty),
    ],
};

static READ_TEXT: ActionRoute = ActionRoute {
    action: LogicalAction::ReadTextLog,
    dispatch: Dispatch::Drain,
    roles: FUNC_MGR_SERIAL,
    candidates: &[
        c("readEpcLog", Empty),
        c("readTagText", Empty),
        c("readLog", Empty),
        c("getTagEpcLog", Empty),
        c("getEpcTxt", Empty),
        c("getLogString", Empty),
        c("getLog", Empty),
    ],
};

static READ_RAW: ActionRoute = ActionRoute {
    action: LogicalAction::ReadRawBuffer,
    dispatch: Dispatch::Drain,
    roles: FUNC_MGR_SERIAL,
    candidates: &[
        c("readBuffer", Empty),
        c("getBuffer", Empty),
        c("getReadBuf", Empty),
        c("readTagBuffer", Empty),
        c("getInventoryBuffer", Empty),
    ],
};

static POWER_ON: ActionRoute = ActionRoute {
    action: LogicalAction::PowerOn,
    dispatch: Dispatch::Broadcast,
    roles: MGR_FUNC,
    candidates: &[
        c("setPowerState_UHF", Fixed(&[Lit::Bool(true)])),
        c("enableUartComm_UHF", Fixed(&[Lit::Bool(true)])),
        c("powerOn", Empty),
    ],
};

static POWER_OFF: ActionRoute = ActionRoute {
    action: LogicalAction::PowerOff,
    dispatch: Dispatch::Broadcast,
    roles: MGR_FUNC,
    candidates: &[
        c("setPowerState_UHF", Fixed(&[Lit::Bool(false)])),
        c("powerOff", Empty),
    ],
};

static RESET: ActionRoute = ActionRoute {
    action: LogicalAction::ResetInventory,
    dispatch: Dispatch::FirstSuccess,
    roles: FUNC_MGR,
    candidates: &[c("inventoryReset", Empty)],
};

static CONTINUOUS: ActionRoute = ActionRoute {
    action: LogicalAction::SetContinuousMode,
    dispatch: Dispatch::Broadcast,
    roles: FUNC_MGR,
    candidates: &[
        c("setContinuousMode", First),
        c("setInventoryContinue", FirstAsInt),
    ],
};

static CALLBACK: ActionRoute = ActionRoute {
    action: LogicalAction::RegisterTagCallback,
    dispatch: Dispatch::Subscribe,
    roles: ALL_SERIAL_FIRST,
    candidates: &[
        c("onTagEpcLog", Empty),
        c("setOnTagEpcLog", Empty),
        c("addTagEpcLogListener", Empty),
    ],
};

/// Routing table lookup
pub fn route(action: LogicalAction) -> &'static ActionRoute {
    match action {
        LogicalAction::StartInventory => &START,
        LogicalAction::StopInventory => &STOP,
        LogicalAction::SetPower => &SET_POWER,
        LogicalAction::SetAntiCollisionParam => &SET_Q,
        LogicalAction::SetDynamicAdaptation => &SET_DYNAMIC,
        LogicalAction::SetSession => &SET_SESSION,
        LogicalAction::SetTarget => &SET_TARGET,
        LogicalAction::SetSignalFilter => &SET_FILTER,
        LogicalAction::SetRegionSingleChannel => &REGION_SINGLE,
        LogicalAction::RestoreRegionHopping => &REGION_RESTORE,
        LogicalAction::ReadOneByPop => &READ_POP,
        LogicalAction::ReadListBatch => &READ_LIST,
        LogicalAction::ReadTextLog => &READ_TEXT,
        LogicalAction::ReadRawBuffer => &READ_RAW,
        LogicalAction::PowerOn => &POWER_ON,
        LogicalAction::PowerOff => &POWER_OFF,
        LogicalAction::ResetInventory => &RESET,
        LogicalAction::SetContinuousMode => &CONTINUOUS,
        LogicalAction::RegisterTagCallback => &CALLBACK,
    }
}

/// Single-channel region setup, flattened into the argument layout
/// [`LogicalAction::SetRegionSingleChannel`] expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionPlan {
    pub region: i64,
    pub channel: i64,
    pub frequency_khz: i64,
    pub profile: i64,
}

impl RegionPlan {
    const NARROW_BAND_KHZ: i64 = 1000;
    const NARROW_STEP_KHZ: i64 = 250;
    const WIDE_BAND_KHZ: i64 = 5000;
    const WIDE_STEP_KHZ: i64 = 500;

    /// `[region, channel, freq, profile, narrow_lo, narrow_hi, narrow_step, wide_lo, wide_hi, wide_step]`
    ///
    /// The narrow band is the 1 MHz block containing the channel, the wide band
    /// the enclosing 5 MHz block.
    pub fn args(&self) -> Vec<HostValue> {
        let narrow_lo = self.frequency_khz - self.frequency_khz.rem_euclid(Self::NARROW_BAND_KHZ);
        let wide_lo = self.frequency_khz - self.frequency_khz.rem_euclid(Self::WIDE_BAND_KHZ);
        [
            self.region,
            self.channel,
            self.frequency_khz,
            self.profile,
            narrow_lo,
            narrow_lo + Self::NARROW_BAND_KHZ,
            Self::NARROW_STEP_KHZ,
            wide_lo,
            wide_lo + Self::WIDE_BAND_KHZ,
            Self::WIDE_STEP_KHZ,
        ]
        .into_iter()
        .map(HostValue::Int)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LogicalAction; 19] = [
        LogicalAction::StartInventory,
        LogicalAction::StopInventory,
        LogicalAction::SetPower,
        LogicalAction::SetAntiCollisionParam,
        LogicalAction::SetDynamicAdaptation,
        LogicalAction::SetSession,
        LogicalAction::SetTarget,
        LogicalAction::SetSignalFilter,
        LogicalAction::SetRegionSingleChannel,
        LogicalAction::RestoreRegionHopping,
        LogicalAction::ReadOneByPop,
        LogicalAction::ReadListBatch,
        LogicalAction::ReadTextLog,
        LogicalAction::ReadRawBuffer,
        LogicalAction::PowerOn,
        LogicalAction::PowerOff,
        LogicalAction::ResetInventory,
        LogicalAction::SetContinuousMode,
        LogicalAction::RegisterTagCallback,
    ];

    #[test]
    fn test_every_action_routes_to_itself() {
        for action in ALL {
            let r = route(action);
            assert_eq!(r.action, action);
            assert!(!r.candidates.is_empty(), "{:?} has no candidates", action);
            assert!(!r.roles.is_empty());
            assert_eq!(r.dispatch == Dispatch::Drain, action.is_read());
        }
    }

    #[test]
    fn test_power_candidate_duplicates_argument() {
        let r = route(LogicalAction::SetPower);
        assert_eq!(r.candidates[0].name, "setReadWritePower");
        let args = r.candidates[0].args.build(&[HostValue::Int(26)]).unwrap();
        assert_eq!(args, vec![HostValue::Int(26), HostValue::Int(26)]);
        assert_eq!(r.candidates[1].args.build(&[HostValue::Int(26)]).unwrap(), vec![HostValue::Int(26)]);
    }

    #[test]
    fn test_missing_arguments_skip_candidate() {
        assert!(First.build(&[]).is_none());
        assert!(Pick(&[0, 3]).build(&[HostValue::Int(1)]).is_none());
        assert_eq!(Empty.build(&[]).unwrap(), Vec::<HostValue>::new());
    }

    #[test]
    fn test_continuous_mode_int_coercion() {
        let args = FirstAsInt.build(&[HostValue::Bool(true)]).unwrap();
        assert_eq!(args, vec![HostValue::Int(1)]);
        assert!(FirstAsInt.build(&[HostValue::from("yes")]).is_none());
    }

    #[test]
    fn test_region_plan_bands() {
        let plan = RegionPlan {
            region: 1,
            channel: 6,
            frequency_khz: 922_625,
            profile: 3,
        };
        let args = plan.args();
        let ints: Vec<i64> = args.iter().filter_map(HostValue::as_i64).collect();
        assert_eq!(
            ints,
            vec![1, 6, 922_625, 3, 922_000, 923_000, 250, 920_000, 925_000, 500]
        );

        let r = route(LogicalAction::SetRegionSingleChannel);
        let user_define = r
            .candidates
            .iter()
            .find(|c| c.name == "setUserDefineFrequency")
            .unwrap();
        assert_eq!(
            user_define.args.build(&args).unwrap(),
            vec![HostValue::Int(922_000), HostValue::Int(923_000), HostValue::Int(250)]
        );
        assert_eq!(r.candidates[0].args.build(&args).unwrap(), vec![HostValue::Bool(false)]);
    }

    #[test]
    fn test_read_lists_are_ordered() {
        let pop = route(LogicalAction::ReadOneByPop);
        assert_eq!(pop.candidates.first().unwrap().name, "readTagFromBuffer");
        assert_eq!(pop.candidates.last().unwrap().name, "getEpcFromBuffer");
        assert_eq!(route(LogicalAction::ReadTextLog).candidates[0].name, "readEpcLog");
    }
}
