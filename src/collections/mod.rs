// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Collections

pub mod events;
