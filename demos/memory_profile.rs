use anyhow::Result;
use devmem::{
    statistics,
    utils::{default_profiler_records, setup_logging, LogConfig, OrderBy},
    DeviceBuffer, MemoryConfig,
};

fn load_batch(rows: u64) -> Result<Vec<DeviceBuffer>> {
    devmem::profile_span!("load_batch");
    let buffers = (0..rows)
        .map(|_| DeviceBuffer::new(4096))
        .collect::<devmem::Result<Vec<_>>>()?;
    Ok(buffers)
}

fn reduce(columns: &[DeviceBuffer]) -> Result<DeviceBuffer> {
    devmem::profile_span!();
    let scratch = DeviceBuffer::new(columns.len() as u64 * 512)?;
    let output = DeviceBuffer::new(scratch.size() / 4)?;
    Ok(output)
}

fn main() -> Result<()> {
    // Initialize logging
    setup_logging(LogConfig {
        level: tracing::Level::INFO,
        ..Default::default()
    })?;

    let config = MemoryConfig::from_json_str(r#"{"device": {"capacity_bytes": 67108864}}"#)?;
    let registry = devmem::config::init(&config)?;
    tracing::info!(stack = %registry.describe_stack(), "Registry ready");

    let scope = statistics::statistics()?;
    for batch in 0..4 {
        let columns = load_batch(16 * (batch + 1))?;
        let _result = reduce(&columns)?;
    }
    println!("{:#?}", scope.statistics());
    scope.exit()?;

    println!("{}", default_profiler_records().pretty_print(OrderBy::MemoryPeak));
    Ok(())
}
