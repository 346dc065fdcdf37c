use criterion::{black_box, criterion_group, criterion_main, Criterion};
use webcomic2pdf::collector::{collect_page_images, pick_from_srcset};
use webcomic2pdf::{PageSnapshot, ScopeRule, StaticDocument};

fn reader_page(pages: usize) -> String {
    let mut html = String::from(r#"<html><body><nav><img src="/logo.png"></nav><div class="reading-content">"#);
    for i in 0..pages {
        html.push_str(&format!(
            r#"<div class="page-break"><img data-src="/ch/{i:03}.jpg" srcset="/ch/{i:03}-480.jpg 480w, /ch/{i:03}-1200.jpg 1200w"></div>"#
        ));
        if i % 10 == 0 {
            html.push_str(&format!(r#"<div class="page-break"><noscript><img src="/ch/{i:03}.jpg"></noscript></div>"#));
        }
    }
    html.push_str("</div></body></html>");
    html
}

fn bench_collect(c: &mut Criterion) {
    let rule = ScopeRule::default();
    let doc = StaticDocument::parse(&reader_page(200), "https://reader.example/series/ch-1/").unwrap();
    let snapshot = PageSnapshot::capture(&doc, &rule).unwrap();

    c.bench_function("collect_static_200_pages", |b| {
        b.iter(|| collect_page_images(black_box(&doc), &rule).unwrap())
    });
    c.bench_function("collect_snapshot_200_pages", |b| {
        b.iter(|| collect_page_images(black_box(&snapshot), &rule).unwrap())
    });
}

fn bench_srcset(c: &mut Criterion) {
    let srcset = "/a-320.jpg 320w, /a-640.jpg 640w, /a-1280.jpg 1280w, /a-1920.jpg 1920w, /a-960.jpg 960w";
    c.bench_function("pick_from_srcset", |b| b.iter(|| pick_from_srcset(black_box(srcset))));
}

criterion_group!(benches, bench_collect, bench_srcset);
criterion_main!(benches);
