// src/main.rs
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::RpcModule;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use arka_zksync::config::{IoPolicy, NetworkConfig};
use arka_zksync::paymaster::Paymaster;
use arka_zksync::policy::Erc20Metadata;
use arka_zksync::rpc::{self, PaymasterRpcImpl};
use arka_zksync::signer::{AuthoritySigner, EnvKeySource, KeyFileSource, KeySource, ScopedKeySigner};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, env = "RPC_SERVER_ADDR", default_value = "127.0.0.1:8545")]
    rpc_server_addr: String,

    #[clap(short, long, env = "ETH_RPC_URL")]
    eth_rpc_url: String,

    #[clap(short, long, env = "CHAIN_ID")]
    chain_id: u64,

    /// Deployed paymaster contract
    #[clap(short, long, env = "PAYMASTER_ADDRESS")]
    paymaster: Address,

    /// Owner configured on the paymaster contract; defaults to the signer
    #[clap(long, env = "PAYMASTER_OWNER")]
    paymaster_owner: Option<Address>,

    /// Environment variable holding the hex signing key
    #[clap(long, default_value = "PAYMASTER_PRIVATE_KEY")]
    signer_key_env: String,

    /// File holding the hex signing key, used instead of the environment
    #[clap(long, env = "PAYMASTER_KEY_FILE")]
    signer_key_file: Option<PathBuf>,

    /// Treat the chain as sponsoring every account itself (Sophon)
    #[clap(long)]
    chain_sponsored: Option<bool>,

    #[clap(long, default_value_t = 10)]
    node_timeout_secs: u64,

    #[clap(long, default_value_t = 2)]
    node_retries: u32,

    #[clap(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let key_source: Box<dyn KeySource> = match &args.signer_key_file {
        Some(path) => Box::new(KeyFileSource::new(path)),
        None => Box::new(EnvKeySource::new(&args.signer_key_env)),
    };
    let signer = ScopedKeySigner::new(key_source)?;

    let mut config = NetworkConfig::new(
        args.chain_id,
        args.eth_rpc_url.clone(),
        args.paymaster,
        args.paymaster_owner.unwrap_or_else(|| signer.address()),
    )
    .with_io(IoPolicy {
        timeout: Duration::from_secs(args.node_timeout_secs),
        max_retries: args.node_retries,
        ..IoPolicy::default()
    });
    if let Some(chain_sponsored) = args.chain_sponsored {
        config.chain_sponsored = chain_sponsored;
    }

    // Create Ethereum client
    let provider = Arc::new(Provider::<Http>::try_from(args.eth_rpc_url.as_str())?);

    // Create the paymaster service
    let paymaster = Paymaster::new(config, Erc20Metadata::new(provider.clone()), signer, provider);

    // Create the JSON-RPC server
    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    let paymaster_rpc = PaymasterRpcImpl::new(Arc::new(paymaster));

    info!("Starting zkSync paymaster RPC server on {}", server_addr);

    // Start the JSON-RPC server
    let server_handle = start_server(server_addr, paymaster_rpc).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn start_server<T, S, N>(
    server_addr: SocketAddr,
    paymaster_rpc: PaymasterRpcImpl<T, S, N>,
) -> anyhow::Result<ServerHandle>
where
    T: arka_zksync::policy::TokenMetadata + 'static,
    S: AuthoritySigner + 'static,
    N: arka_zksync::nonce::NonceSource + 'static,
{
    let server = ServerBuilder::default()
        .build(server_addr)
        .await?;

    let mut module = RpcModule::new(paymaster_rpc);
    rpc::register_methods(&mut module)?;
    let server_handle = server.start(module);

    Ok(server_handle)
}
