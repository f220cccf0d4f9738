//! Basic usage example for the vault lease SDK

use vault_lease_sdk::{ClientBuilder, Credentials};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = create_client()?;

    // Example 1: Read a static secret
    println!("=== Example 1: Read a static secret ===");
    read_secret_example(&client).await?;

    // Example 2: Read a dynamic secret and watch its lease
    println!("\n=== Example 2: Dynamic secret with a lease ===");
    dynamic_secret_example(&client).await?;

    // Example 3: Clean shutdown
    println!("\n=== Example 3: Logout ===");
    client.logout().await?;
    println!("Session token revoked, {} leases tracked", client.leases().active_count());

    Ok(())
}

fn create_client() -> Result<vault_lease_sdk::Client, Box<dyn std::error::Error>> {
    let base_url =
        std::env::var("VAULT_ADDR").unwrap_or_else(|_| "http://127.0.0.1:8200".to_string());

    // A static token from the environment, or AppRole when both ids are set.
    let credentials = match (std::env::var("VAULT_ROLE_ID"), std::env::var("VAULT_SECRET_ID")) {
        (Ok(role_id), Ok(secret_id)) => Credentials::app_role(role_id, secret_id),
        _ => Credentials::token(
            std::env::var("VAULT_TOKEN").unwrap_or_else(|_| "dev-root-token".to_string()),
        ),
    };

    let client = ClientBuilder::new(base_url)
        .credentials(credentials)
        .user_agent_extra("demos/1.0")
        .build()?;

    Ok(client)
}

async fn read_secret_example(
    client: &vault_lease_sdk::Client,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = client.read("secret/data/app-config").await?;

    println!("Read {} keys from {}", record.data.len(), record.path);
    if let Some(request_id) = &record.request_id {
        println!("Request ID: {request_id}");
    }
    Ok(())
}

async fn dynamic_secret_example(
    client: &vault_lease_sdk::Client,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = client.read("database/creds/readonly").await?;

    match &record.lease_id {
        Some(lease_id) => {
            let lease = client.leases().lookup(lease_id)?;
            println!(
                "Credentials leased until {} (renewable: {})",
                lease.expires_at(),
                lease.renewable
            );
            // The manager renews this in the background; nothing else to do.
        }
        None => println!("Backend returned no lease; credentials are static"),
    }
    Ok(())
}
