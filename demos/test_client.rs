//! Simple test client for the gateway.
//!
//! Run with: cargo run --example test_client -- [SOCKET] [TOKEN]
//!
//! Tests:
//! 1. index/ping - Health check, no login
//! 2. index/echo - Signed request
//! 3. index/echo - Same request again (duplicate submission)
//! 4. index/echo - Tampered parameter
//! 5. index/echo - Expired timestamp
//! 6. index/echo - Missing nonce

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::{SystemTime, UNIX_EPOCH};

use apigate::guard::{Canonicalizer, SignatureVerifier};
use serde_json::{json, Map, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let socket = args
        .next()
        .unwrap_or_else(|| "/run/apigate/gateway.sock".to_string());
    let token = args.next().unwrap_or_else(|| "dev-token".to_string());

    println!("=== Gateway Test Client ===\n");

    println!("Test 1: index/ping");
    print_response(&send(&socket, "index", "ping", Map::new())?)?;

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let signed = sign(base_params(&token, now, "demo-nonce-1"));

    println!("Test 2: index/echo (signed)");
    print_response(&send(&socket, "index", "echo", signed.clone())?)?;

    println!("Test 3: index/echo (replayed, expect 555)");
    print_response(&send(&socket, "index", "echo", signed.clone())?)?;

    println!("Test 4: index/echo (tampered, expect 504)");
    let mut tampered = signed;
    tampered.insert("message".to_string(), json!("changed in transit"));
    print_response(&send(&socket, "index", "echo", tampered)?)?;

    println!("Test 5: index/echo (expired, expect 505)");
    let expired = sign(base_params(&token, now - 3600, "demo-nonce-2"));
    print_response(&send(&socket, "index", "echo", expired)?)?;

    println!("Test 6: index/echo (missing nonce, expect 503)");
    let mut missing = base_params(&token, now, "demo-nonce-3");
    missing.remove("nonce");
    print_response(&send(&socket, "index", "echo", sign(missing))?)?;

    println!("=== Done ===");
    Ok(())
}

fn base_params(token: &str, timestamp: u64, nonce: &str) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("token".to_string(), json!(token));
    params.insert("timestamp".to_string(), json!(timestamp.to_string()));
    params.insert("nonce".to_string(), json!(nonce));
    params.insert("message".to_string(), json!("hello/世界"));
    params
}

/// Canonicalize, hash and attach the signature.
fn sign(mut params: Map<String, Value>) -> Map<String, Value> {
    let signature = match Canonicalizer::default().canonicalize(&params) {
        Ok(payload) => SignatureVerifier::md5().sign(&payload),
        Err(e) => {
            eprintln!("Failed to canonicalize parameters: {}", e);
            String::new()
        }
    };
    params.insert("signature".to_string(), Value::String(signature));
    params
}

fn send(
    socket: &str,
    controller: &str,
    action: &str,
    params: Map<String, Value>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut stream = UnixStream::connect(socket)?;

    let request = serde_json::to_vec(&json!({
        "controller": controller,
        "action": action,
        "params": params,
    }))?;

    stream.write_all(&(request.len() as u32).to_be_bytes())?;
    stream.write_all(&request)?;
    stream.flush()?;

    let mut length_bytes = [0u8; 4];
    stream.read_exact(&mut length_bytes)?;
    let mut body = vec![0u8; u32::from_be_bytes(length_bytes) as usize];
    stream.read_exact(&mut body)?;

    Ok(serde_json::from_slice(&body)?)
}

fn print_response(response: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("Response: {}\n", serde_json::to_string_pretty(response)?);
    Ok(())
}
