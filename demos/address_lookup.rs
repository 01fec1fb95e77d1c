//! Brazilian postal code (CEP) lookup against the public ViaCEP API.
//!
//! ```text
//! cargo run --example address_lookup -- 01001000
//! RUST_LOG=courier_net=debug cargo run --example address_lookup -- 01001000
//! ```

use courier::prelude::*;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Address {
    cep: String,
    #[serde(rename = "logradouro")]
    street: String,
    #[serde(rename = "complemento", default)]
    complement: String,
    #[serde(rename = "bairro")]
    neighborhood: String,
    #[serde(rename = "localidade")]
    locality: String,
    #[serde(rename = "uf")]
    state: String,
    #[serde(default)]
    ibge: String,
}

struct ViaCep(Transport);

impl Api for ViaCep {
    const ROUTE: Option<&'static str> = Some("https://viacep.com.br/ws/");

    fn bind(transport: Transport) -> Self {
        Self(transport)
    }
}

impl ViaCep {
    fn address(&self, cep: &str) -> Call<Address> {
        self.0.call(Endpoint::get("{cep}/json/").path("cep", cep))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cep = std::env::args().nth(1).unwrap_or_else(|| "01001000".to_string());

    let network = Network::new(
        NetworkConfig::builder()
            .from_env()?
            .protocol_module(JsonCodecModule)
            .client_module(LogModule::new(LogLevel::Basic))
            .interceptor(OfflineInterceptor::default())
            .build(),
    );
    let api = network.build::<ViaCep>()?;
    tracing::info!(%cep, "Looking up address");

    let (sender, receiver) = oneshot::channel();
    let (error_sender, error_receiver) = oneshot::channel();
    Promise::from_call(&network, api.address(&cep))
        .then(move |address| {
            let _ = sender.send(address);
        })
        .catch(move |error| {
            let _ = error_sender.send(error);
        });

    tokio::select! {
        Ok(address) = receiver => match address {
            Some(address) => println!(
                "{}, {} - {}/{}",
                address.street, address.neighborhood, address.locality, address.state
            ),
            None => println!("No address for {cep}"),
        },
        Ok(error) = error_receiver => {
            eprintln!("Lookup failed: {}", error.unwrap_or_else(|| "canceled".to_string()));
        }
        else => eprintln!("Lookup finished without an outcome"),
    }

    Ok(())
}
