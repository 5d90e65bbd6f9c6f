// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # uhfscan-hal
//!
//! Capability bridge for UHF tag readers whose control surface differs per
//! hardware revision.
//!
//! A reader stack exposes one to three *capability hosts* (a low-level function
//! surface, a manager surface, a serial transport client). Callers express
//! *what* they want through a [`LogicalAction`]; the [`CapabilityBridge`]
//! resolves *how* by trying candidate method names on each host in priority
//! order. A missing method, wrong arity or mismatched argument type is not an
//! error: the next candidate is tried.
//!
//! ```text
//! LogicalAction::SetAntiCollisionParam(4)
//!        │
//!        ▼
//! ┌──────────────────┐   setQ(4) / SetQValue(4)   ┌───────────────┐
//! │ CapabilityBridge │ ─────────────────────────▶ │ Function host │
//! │ (route + cache)  │ ─────────────────────────▶ │ Manager host  │
//! └──────────────────┘                            └───────────────┘
//! ```
//!
//! Hosts are implemented either statically (a type implementing
//! [`CapabilityHost`]) or as a plugin-registered [`FunctionTableHost`].

/// Logical actions and their candidate routes.
pub mod action;
/// Bridge, host provider and resolution cache.
pub mod bridge;
/// Error types.
pub mod error;
/// Capability host trait.
pub mod host;
/// Scripted in-memory reader used by tools and tests.
pub mod sim;
/// Plugin-registered function table host.
pub mod table;
/// Dynamically typed values crossing the bridge.
pub mod value;

pub use action::{route, ActionRoute, ArgMap, Candidate, Dispatch, Lit, LogicalAction, RegionPlan};
pub use bridge::{CapabilityBridge, HostHandle, HostProvider, StaticHosts};
pub use error::{CallError, HalError};
pub use host::{CapabilityHost, HostRole, MethodId, MethodSignature, TagCallback};
pub use table::{FunctionTableHost, FunctionTableHostBuilder, HostFn};
pub use sim::{SimCall, SimSurface, SimulatedReader};
pub use value::HostValue;
