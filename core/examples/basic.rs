//! Basic circuit breaker usage example

use rate_breaker::{CircuitBreaker, CircuitError, State};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    let circuit = CircuitBreaker::builder("payment_api")
        .failure_rate(50.0)
        .recovery_rate(60.0)
        .min_requests(4)
        .fixed_window(10)
        .cooldown_secs(1.0)
        .max_requests_on_half_open(2)
        .on_state_change(|name, from, to, metrics| {
            println!(
                "Circuit '{}' {} -> {} (failure rate {:.0}%)",
                name,
                from,
                to,
                metrics.failure_rate()
            )
        })
        .build()
        .expect("valid circuit settings");

    println!("Initial state: {}\n", circuit.state());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.call(move |name| Ok::<_, String>(format!("{}: payment {}", name, i))) {
            Ok(result) => println!("ok  {}", result),
            Err(e) => println!("err {}", e),
        }
    }
    println!("State: {}\n", circuit.state());

    println!("--- Triggering failures ---");
    for i in 1..=3 {
        match circuit.call(move |_| Err::<String, _>(format!("payment failed {}", i))) {
            Ok(_) => println!("ok"),
            Err(e) => println!("err {}", e),
        }
    }
    println!("State: {}\n", circuit.state());

    println!("--- Attempting call while open ---");
    match circuit.call(|_| Ok::<_, String>("should be rejected")) {
        Err(CircuitError::NotPermitted(e)) => println!("rejected: {}", e),
        other => println!("unexpected: {:?}", other),
    }
    println!();

    println!("--- Waiting out the cooldown ---");
    std::thread::sleep(Duration::from_millis(1200));
    println!("State: {}\n", circuit.state());

    println!("--- Probing recovery ---");
    while circuit.state() == State::HalfOpen {
        let _ = circuit.call(|_| Ok::<_, String>("probe ok"));
    }
    println!("State: {}\n", circuit.state());

    println!("--- Resetting circuit ---");
    circuit.reset();
    println!("State after reset: {}", circuit.state());
}
