// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Simulated cache-read workload instrumented with the call-site macros.
//!
//! Run with an output path to get a JSON call tree:
//! `DD_CALL_TREE_OUTPUT=/tmp/tree.json cargo run --example cache_read`

use datadog_call_tree::{profile_block, profile_merge_block, Profiler};
use std::thread::sleep;
use std::time::Duration;

fn find_record(i: u32) -> bool {
    sleep(Duration::from_micros(10));
    i % 4 == 0
}

fn read_from_disk() -> String {
    profile_merge_block!("read_from_disk");
    sleep(Duration::from_micros(1000));
    "DISK".to_owned()
}

fn put_into_cache(_data: &str) {
    profile_block!("put_into_cache");
    sleep(Duration::from_micros(50));
}

fn load_from_cache() -> String {
    profile_block!("load_from_cache");
    sleep(Duration::from_micros(25));
    "CACHE".to_owned()
}

fn cache_read(i: u32) -> String {
    profile_merge_block!("cache_read");

    let found = {
        profile_merge_block!("find_record");
        find_record(i)
    };

    if !found {
        profile_block!("load_from_disk");
        let data = read_from_disk();
        put_into_cache(&data);
        // Every early return still closes its guards.
        return data;
    }
    load_from_cache()
}

fn main() -> anyhow::Result<()> {
    const ITERATIONS: u32 = 10;

    println!("Running cache read {ITERATIONS} times");
    for i in 0..ITERATIONS {
        let _ = cache_read(i);
    }

    let profiler = Profiler::global();
    profiler.flush()?;
    let snapshot = profiler.tree().copy_call_tree();
    println!("{}", serde_json::to_string_pretty(&snapshot.to_json()?)?);
    Ok(())
}
