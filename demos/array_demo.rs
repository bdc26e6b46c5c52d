//! Parse a small array and inspect each element
//!
//! Run with: cargo run --example array-demo

use jparse::{CountingAllocator, Session, ValueType};

fn main() {
    let session = Session::new(CountingAllocator::new());

    {
        let res = match session.parse(r#"[1.0, "hello world", true]"#) {
            Ok(doc) => doc,
            Err(e) => {
                eprintln!("parse failed: {}", e);
                std::process::exit(1);
            }
        };
        assert_eq!(res.value_type(), ValueType::Array);
        println!("arr length: {}", res.array_len().unwrap_or(0));

        for (i, item) in res.as_array().into_iter().flatten().enumerate() {
            match item.value_type() {
                ValueType::Float => println!("[{}]: {:.6}", i, item.as_float().unwrap_or_default()),
                ValueType::String => println!("[{}]: {}", i, item.as_str().unwrap_or_default()),
                ValueType::Bool => println!("[{}]: {}", i, item.as_bool().unwrap_or_default()),
                other => println!("[{}]: <{}>", i, other),
            }
        }

        println!("{}", res.render());
    }

    let stats = session.stats();
    let allocator = session.destroy();
    println!(
        "allocations: {}, peak bytes: {}, outstanding blocks: {}",
        stats.total_allocations,
        stats.peak_bytes,
        allocator.outstanding_blocks()
    );
}
