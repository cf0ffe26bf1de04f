use rcgen::{CertificateParams, KeyPair};

/// Generate and dump Rust source for the self-signed certificate and
/// private key embedded in the tests under `tests/`.  Expires in 2099.
/// The tests validate against the name `example.com`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut params = CertificateParams::new(vec!["example.com".into()])?;
    params.not_after = params.not_after.replace_year(2099).unwrap();

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    println!("const CERT_PEM: &str = r\"\n{}\";", cert.pem());
    println!("const KEY_PEM: &str = r\"\n{}\";", key_pair.serialize_pem());
    Ok(())
}
