//! `scg ping`, `scg models`, `scg state` — connection checks.

use scg_core::wrapper::CopilotWrapper;

pub async fn ping(wrapper: &CopilotWrapper, message: &str) -> Result<(), String> {
    let response = wrapper.ping(message).await.map_err(|e| e.to_string())?;
    println!("{} (server time {})", response.message, response.formatted_local_time());
    if let Some(version) = response.protocol_version {
        println!("Protocol version: {}", version);
    }
    Ok(())
}

pub async fn models(wrapper: &CopilotWrapper, json: bool) -> Result<(), String> {
    let models = wrapper.list_models().await.map_err(|e| e.to_string())?;

    if json {
        let value = serde_json::to_value(&models).map_err(|e| e.to_string())?;
        super::print_json(&value);
        return Ok(());
    }

    if models.is_empty() {
        println!("No models available.");
        return Ok(());
    }
    let width = models.iter().map(|m| m.id.len()).max().unwrap_or(0);
    for model in &models {
        println!("{:<width$}  {}", model.id, model.name, width = width);
    }
    Ok(())
}

pub fn state(wrapper: &CopilotWrapper) -> Result<(), String> {
    println!("{}", wrapper.check_connection());
    Ok(())
}
