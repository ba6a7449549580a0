// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![no_main]
use libfuzzer_sys::fuzz_target;
use rcs_core::ftinfo::parse_file_info;

fuzz_target!(|data: &[u8]| {
    // Parse should either succeed or return an FtInfoError, never panic
    let _ = parse_file_info(data);
});
