use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = modbus_master::cli::parse_args();
    modbus_master::boot::init_logger(
        matches
            .get_one::<String>("log-file")
            .map(String::as_str),
    );

    modbus_master::boot::start(&matches).await
}
