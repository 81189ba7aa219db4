//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use chrono::Utc;
use ecotrace_core::{
    Category, EcotraceError, Engine, FactorGrams, FactorTable, RedbStore, TimeRange, UserId,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// FACTOR OVERRIDES
// =============================================================================

/// Maximum size of a factor override file (1 MB). A factor table has a few
/// dozen entries; anything bigger is a mistake.
const MAX_FACTORS_FILE_SIZE: u64 = 1024 * 1024;

/// On-disk shape of a factor override file:
///
/// ```toml
/// [factors.transportation]
/// bus = 0.075
///
/// [fallbacks]
/// food = 1.5
/// ```
///
/// Values are kg CO2e per unit.
#[derive(Debug, Deserialize)]
struct FactorOverrides {
    #[serde(default)]
    factors: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    fallbacks: BTreeMap<String, f64>,
}

/// Build the resolved factor table: the built-in entries with the override
/// file (if any) merged on top.
pub fn load_factor_table(factors_file: Option<&Path>) -> Result<FactorTable, EcotraceError> {
    let mut table = FactorTable::builtin();
    let Some(path) = factors_file else {
        return Ok(table);
    };

    let metadata = std::fs::metadata(path)
        .map_err(|e| EcotraceError::Io(format!("Cannot read factors file metadata: {}", e)))?;
    if metadata.len() > MAX_FACTORS_FILE_SIZE {
        return Err(EcotraceError::validation(
            "factors_file",
            format!(
                "file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_FACTORS_FILE_SIZE
            ),
        ));
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| EcotraceError::Io(format!("Cannot read factors file: {}", e)))?;
    let overrides: FactorOverrides = toml::from_str(&raw)
        .map_err(|e| EcotraceError::validation("factors_file", e.to_string()))?;

    for (category_name, entries) in &overrides.factors {
        let category = parse_category(category_name)?;
        for (subcategory, kg) in entries {
            let factor = parse_factor(*kg)?;
            table.set_factor(category, subcategory.clone(), factor)?;
            tracing::info!(
                category = category_name.as_str(),
                subcategory = subcategory.as_str(),
                "factor override applied"
            );
        }
    }
    for (category_name, kg) in &overrides.fallbacks {
        let category = parse_category(category_name)?;
        table.set_fallback(category, parse_factor(*kg)?)?;
        tracing::info!(category = category_name.as_str(), "fallback override applied");
    }

    Ok(table)
}

fn parse_category(name: &str) -> Result<Category, EcotraceError> {
    Category::parse(name).ok_or_else(|| {
        EcotraceError::validation("factors_file", format!("unknown category '{name}'"))
    })
}

fn parse_factor(kg: f64) -> Result<FactorGrams, EcotraceError> {
    FactorGrams::from_kg_per_unit_f64(kg).ok_or_else(|| {
        EcotraceError::validation(
            "factors_file",
            "factors must be finite, non-negative kg per unit",
        )
    })
}

// =============================================================================
// ENGINE LOADING
// =============================================================================

/// Open the engine on the selected backend.
fn load_engine(
    db_path: &PathBuf,
    backend: &str,
    factors_file: Option<&Path>,
) -> Result<Engine, EcotraceError> {
    let table = load_factor_table(factors_file)?;
    match backend {
        "memory" => Ok(Engine::in_memory(table)),
        "redb" => Engine::open(db_path, table),
        other => Err(EcotraceError::validation(
            "backend",
            format!("unknown backend '{other}' (expected redb or memory)"),
        )),
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    db_path: &PathBuf,
    backend: &str,
    factors_file: Option<&Path>,
    host: &str,
    port: u16,
) -> Result<(), EcotraceError> {
    let engine = load_engine(db_path, backend, factors_file)?;

    println!("Ecotrace Carbon Accounting Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", backend);
    println!("  Database: {:?}", db_path);
    println!();
    println!("Endpoints:");
    println!("  POST   /emissions       - Record an emission");
    println!("  GET    /emissions       - List records");
    println!("  GET    /emissions/stats - Statistics");
    println!("  GET    /emissions/{{id}}  - Fetch one record");
    println!("  PUT    /emissions/{{id}}  - Update a record");
    println!("  DELETE /emissions/{{id}}  - Delete a record");
    println!("  GET    /factors         - Factor table");
    println!("  GET    /ws              - Change notifications");
    println!("  GET    /health          - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, engine).await
}

// =============================================================================
// STATS COMMAND
// =============================================================================

/// Show a user's emission statistics.
pub fn cmd_stats(
    db_path: &PathBuf,
    backend: &str,
    factors_file: Option<&Path>,
    json_mode: bool,
    user: u64,
    range: &str,
) -> Result<(), EcotraceError> {
    let engine = load_engine(db_path, backend, factors_file)?;
    let range = TimeRange::parse(range).ok_or_else(|| {
        EcotraceError::validation(
            "range",
            format!("unknown range '{range}' (expected all, week, month, or year)"),
        )
    })?;
    let summary = engine.stats(UserId(user), &range, Utc::now())?;

    if json_mode {
        let output = serde_json::json!({
            "user_id": user,
            "total_emissions_kg": summary.total_emissions.as_kg_f64(),
            "total_entries": summary.total_entries,
            "average_emission_kg": summary.average_emission.as_kg_f64(),
            "highest_emission_kg": summary.highest_emission.as_kg_f64(),
            "breakdown": summary.breakdown.iter().map(|slice| serde_json::json!({
                "category": slice.category.as_str(),
                "total_kg": slice.total.as_kg_f64(),
                "count": slice.count,
                "average_kg": slice.average.as_kg_f64(),
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Ecotrace Emission Statistics");
    println!("============================");
    println!("User:    {}", user);
    println!();
    println!("Total:   {} kg CO2e", summary.total_emissions);
    println!("Entries: {}", summary.total_entries);
    println!("Average: {} kg CO2e", summary.average_emission);
    println!("Highest: {} kg CO2e", summary.highest_emission);

    if !summary.breakdown.is_empty() {
        println!();
        println!("By category:");
        for slice in &summary.breakdown {
            println!(
                "  {:<16} {} kg CO2e ({} entries)",
                slice.category, slice.total, slice.count
            );
        }
    }

    Ok(())
}

// =============================================================================
// RECONCILE COMMAND
// =============================================================================

/// Recompute a user's ledger from their records and repair drift.
pub fn cmd_reconcile(
    db_path: &PathBuf,
    backend: &str,
    factors_file: Option<&Path>,
    json_mode: bool,
    user: u64,
) -> Result<(), EcotraceError> {
    let mut engine = load_engine(db_path, backend, factors_file)?;
    let outcome = engine.reconcile_ledger(UserId(user))?;

    if outcome.drift() != 0 {
        tracing::error!(
            user_id = user,
            previous = %outcome.previous,
            recomputed = %outcome.recomputed,
            "ledger drift detected and repaired"
        );
    }

    if json_mode {
        let output = serde_json::json!({
            "user_id": user,
            "previous_kg": outcome.previous.as_kg_f64(),
            "recomputed_kg": outcome.recomputed.as_kg_f64(),
            "drifted": outcome.drift() != 0,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Ecotrace Ledger Reconciliation");
    println!("==============================");
    println!("User:       {}", user);
    println!("Previous:   {} kg CO2e", outcome.previous);
    println!("Recomputed: {} kg CO2e", outcome.recomputed);
    if outcome.drift() == 0 {
        println!("Ledger was consistent.");
    } else {
        println!("Drift repaired.");
    }

    Ok(())
}

// =============================================================================
// FACTORS COMMAND
// =============================================================================

/// Dump the resolved factor table.
pub fn cmd_factors(factors_file: Option<&Path>, json_mode: bool) -> Result<(), EcotraceError> {
    let table = load_factor_table(factors_file)?;

    if json_mode {
        let output = serde_json::json!({
            "factors": table.entries().map(|(category, subcategory, factor)| serde_json::json!({
                "category": category.as_str(),
                "subcategory": subcategory,
                "kg_per_unit": factor.as_kg_per_unit_f64(),
            })).collect::<Vec<_>>(),
            "fallbacks": table.fallbacks().map(|(category, factor)| serde_json::json!({
                "category": category.as_str(),
                "kg_per_unit": factor.as_kg_per_unit_f64(),
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Ecotrace Emission Factors (kg CO2e per unit)");
    println!("============================================");
    for (category, subcategory, factor) in table.entries() {
        println!(
            "  {:<16} {:<16} {}",
            category,
            subcategory,
            factor.as_kg_per_unit_f64()
        );
    }
    println!();
    println!("Fallbacks (unknown subcategories):");
    for (category, factor) in table.fallbacks() {
        println!("  {:<16} {}", category, factor.as_kg_per_unit_f64());
    }

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new empty database.
pub fn cmd_init(db_path: &PathBuf, force: bool) -> Result<(), EcotraceError> {
    if db_path.exists() && !force {
        return Err(EcotraceError::Io(format!(
            "Database {:?} already exists (use --force to overwrite)",
            db_path
        )));
    }
    if db_path.exists() {
        std::fs::remove_file(db_path)
            .map_err(|e| EcotraceError::Io(format!("Cannot remove existing database: {}", e)))?;
    }

    let store = RedbStore::open(db_path)?;
    drop(store);
    println!("Initialized empty emission database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
