use sqlriver_core::{Batch, Document, FieldValue, IndexTarget};
use sqlriver_elastic::render_bulk;

fn synthetic_batch(n: usize) -> Batch {
    let mut batch = Batch::with_capacity(IndexTarget::default(), n);
    for i in 0..n {
        let mut doc = Document::new();
        doc.insert("id", FieldValue::Long(i as i64));
        doc.insert("title", FieldValue::String(format!("Title for record {i}")));
        doc.insert("score", FieldValue::Double(i as f64 * 0.5));
        doc.insert("active", FieldValue::Bool(i % 2 == 0));
        batch.push(Some(i.to_string()), doc);
    }
    batch
}

#[divan::bench(args = [100, 1000, 10000])]
fn render_ndjson(bencher: divan::Bencher, n: usize) {
    let batch = synthetic_batch(n);
    bencher.bench(|| render_bulk(&batch, false).unwrap());
}

fn main() {
    divan::main();
}
