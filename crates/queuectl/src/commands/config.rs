//! Configuration commands.

use super::Context;
use anyhow::Result;
use serde_json::Value;

pub async fn get(ctx: &Context, key: Option<&str>) -> Result<()> {
    match key {
        Some(key) => {
            let value = ctx.loader().get_value(key).await?;
            println!("{}", display_value(&value));
        }
        None => {
            let config = ctx.loader().get().await;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

pub async fn set(ctx: &Context, key: &str, raw: &str) -> Result<()> {
    let value = ctx.loader().set_value(key, raw).await?;
    println!("{key} = {}", display_value(&value));
    Ok(())
}

/// Strings print without JSON quotes.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
