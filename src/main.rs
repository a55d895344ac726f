use color_eyre::eyre::WrapErr;
use nfse_signer::{
    client::{ClientIdentity, SubmissionClient},
    config::Config,
    dsig::{self, SignConfig},
    pki::Credentials,
    telemetry,
};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let config = Config::load().wrap_err("Loading configuration")?;
    tracing::info!(
        payload = %config.payload_path.display(),
        reference_id = %config.signer.reference_id,
        algorithm = %config.signer.algorithm,
        "Loaded configuration"
    );

    let payload = std::fs::read_to_string(&config.payload_path)
        .wrap_err_with(|| format!("Reading payload {}", config.payload_path.display()))?;

    let credentials = Credentials::load(
        &config.signer.key_path,
        config.signer.certificate_path.as_deref(),
        config.signer.key_passphrase.as_ref(),
    )
    .wrap_err("Loading signing credentials")?;
    let sign_config = SignConfig::new(credentials, config.signer.algorithm);

    let signed = dsig::sign(&payload, &config.signer.reference_id, &sign_config)
        .wrap_err("Signing payload")?;
    dsig::verify(signed.as_str()).wrap_err("Verifying signed payload")?;
    tracing::info!(uri = signed.reference_uri(), "Signed payload verified locally");

    let Some(client_config) = &config.client else {
        println!("{signed}");
        return Ok(());
    };

    let identity = ClientIdentity::load(
        &client_config.identity_path,
        client_config.certificate_path.as_deref(),
        client_config.identity_passphrase.as_ref(),
    )
    .wrap_err("Loading client identity")?;
    let client = SubmissionClient::new(client_config, identity).wrap_err("Building client")?;

    match client.submit(signed.as_str()).await {
        Ok(response) => {
            if let Some(transcript) = &response.transcript {
                eprintln!("{transcript}");
            }
            println!("{}", response.body);
            Ok(())
        }
        Err(err) => {
            if let Some(transcript) = err.transcript() {
                eprintln!("{transcript}");
            }
            if let Some(body) = err.body() {
                eprintln!("{body}");
            }
            Err(err).wrap_err_with(|| format!("Submitting to {}", client.endpoint()))
        }
    }
}
