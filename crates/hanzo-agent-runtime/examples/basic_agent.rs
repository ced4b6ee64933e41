//! Triage example
//!
//! A triage agent that answers weather questions with a tool and hands
//! Spanish speakers off to a dedicated agent.
//!
//! Run with:
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! cargo run --example basic_agent
//! ```

use hanzo_agent_runtime::prelude::*;
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let runner = Runner::from_config(AgentsConfig::from_env()?);

    let get_weather = FunctionTool::builder("get_weather")
        .description("Current weather for a city")
        .schema(json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "The city to look up"
                }
            },
            "required": ["city"]
        }))
        .handler(|_ctx, args| {
            let city = args["city"].as_str().ok_or_else(|| AgentError::ToolError {
                tool_name: "get_weather".to_string(),
                message: "city is required".to_string(),
            })?;
            Ok(json!(format!("The weather in {} is sunny", city)))
        })
        .build()?;

    let spanish = Agent::builder("Spanish agent")
        .instructions("You only speak Spanish.")
        .handoff_description("Handles conversations in Spanish")
        .build();

    let triage = Agent::builder("Triage agent")
        .instructions(
            "Answer weather questions with the get_weather tool. \
             Hand off to the Spanish agent when the user writes in Spanish.",
        )
        .tool(get_weather)
        .handoff(spanish)
        .build();

    let config = RunConfig::default()
        .with_workflow_name("Triage example")
        .with_max_turns(5);

    println!("Running agent...\n");
    let result = runner
        .run(&triage, "What's the weather in Tokyo?", RunContext::new(), None, &config)
        .await?;

    println!("\n=== Results ===");
    println!("Answered by: {}", result.last_agent().name);
    println!("Final output: {}", result.text_output());
    println!("\nUsage:");
    println!("  Requests: {}", result.usage.requests);
    println!("  Input tokens: {}", result.usage.input_tokens);
    println!("  Output tokens: {}", result.usage.output_tokens);
    println!("  Total tokens: {}", result.usage.total_tokens);

    println!("\n=== Streaming ===");
    let mut streamed = runner.run_streamed(
        &triage,
        "¿Qué tiempo hace en Madrid?",
        RunContext::new(),
        None,
        config,
    );
    streamed.subscribe(
        StreamCallbacks::new()
            .on_token(|token| print!("{}", token))
            .on_agent_changed(|agent| println!("\n[handoff to {}]", agent.name)),
    );
    let result = streamed.wait().await?;
    println!("\n\nAnswered by: {}", result.last_agent().name);

    Ok(())
}
