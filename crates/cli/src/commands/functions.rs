//! `steward functions`: list the functions the model may call.

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let registry = steward_functions::default_registry();

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.to_json_schema())?);
        return Ok(());
    }

    println!("Built-in functions ({})", registry.len());
    println!("====================");
    println!();
    for line in registry.to_prompt().lines() {
        println!("  {line}");
    }

    Ok(())
}
