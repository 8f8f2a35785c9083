use montage_core::types::TransitionKind;

pub fn run(json: bool) -> anyhow::Result<()> {
    if json {
        let names: Vec<_> = TransitionKind::ALL.iter().collect();
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    println!("Available transitions");
    println!("{}", "=".repeat(50));
    for kind in TransitionKind::ALL {
        println!("  {:<11} {:<12} {}", kind.as_str(), kind.display_name(), kind.description());
    }
    Ok(())
}
