use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Largest echo payload a worker sends.
const MAX_PAYLOAD: usize = 16 * 1024;

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that keep one connection each open to
/// `addr` and POST random-size bodies to `/api/echo` until `running`
/// is cleared.
pub async fn run(running: Arc<AtomicBool>, addr: SocketAddr, concurrency: u32) {
    info!(concurrency, "load generator started");
    let mut handles = Vec::with_capacity(concurrency as usize);

    for worker_id in 0..concurrency {
        let running = running.clone();
        handles.push(tokio::spawn(async move {
            worker(worker_id, running, addr).await;
        }));
    }

    // Wait for all workers to finish
    for h in handles {
        let _ = h.await;
    }
    info!("load generator stopped");
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(id: u32, running: Arc<AtomicBool>, addr: SocketAddr) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(worker = id, error = %e, "connect failed");
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
        };
        let mut conn = BufReader::new(stream);

        // Reuse the connection until the server closes it
        while running.load(Ordering::Relaxed) {
            let payload: Vec<u8> = (0..rng.gen_range(0..=MAX_PAYLOAD))
                .map(|_| rng.gen_range(b'a'..=b'z'))
                .collect();

            if let Err(e) = echo(&mut conn, addr, &payload).await {
                debug!(worker = id, error = %e, "request failed, reconnecting");
                break;
            }
            tokio::time::sleep(Duration::from_millis(rng.gen_range(5..50))).await;
        }
    }
}

// ─── One request ─────────────────────────────────────────────────

async fn echo(
    conn: &mut BufReader<TcpStream>,
    addr: SocketAddr,
    payload: &[u8],
) -> std::io::Result<()> {
    let head = format!(
        "POST /api/echo HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    );
    conn.get_mut().write_all(head.as_bytes()).await?;
    conn.get_mut().write_all(payload).await?;

    // Status line + headers
    let mut content_length = 0usize;
    let mut line = String::new();
    loop {
        line.clear();
        if conn.read_line(&mut line).await? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    conn.read_exact(&mut body).await?;
    Ok(())
}
