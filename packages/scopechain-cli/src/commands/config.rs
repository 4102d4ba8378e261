use super::{exit_code_for, load_config};
use crate::cli::ConfigArgs;
use crate::exit_codes;
use crate::output;

pub fn execute(args: ConfigArgs) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };

    if args.json {
        if let Err(e) = output::print_json(&config, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
        return exit_codes::SUCCESS;
    }

    let layout = match (config.layout.sequence, config.layout.sample_rate) {
        (false, false) => "selector samples...",
        (true, false) => "sequence selector samples...",
        (false, true) => "sample_rate selector samples...",
        (true, true) => "sequence sample_rate selector samples...",
    };

    println!("Width:               {}", config.width);
    println!("Depth:               {}", config.depth);
    println!("Selectors/source:    {}", config.selectors_per_source);
    println!("Line layout:         {}", layout);
    println!("Fill:                {:?}", config.fill);
    println!("Mean removal:        {}", config.mean_removal);
    println!(
        "Transformed width:   {}",
        config
            .transformed_width
            .map(|w| w.to_string())
            .unwrap_or_else(|| "from transform".to_string())
    );
    println!("Line queue capacity: {}", config.line_queue_capacity);
    println!("Tick:                {} ms", config.tick_ms);
    println!("Poll timeout:        {} ms", config.poll_timeout_ms);

    exit_codes::SUCCESS
}
