use pdf2img::job::{InputFile, Job};
use pdf2img::util::{looks_like_pdf, sanitize_stem};

#[test]
fn stems_are_path_safe() {
    assert_eq!(sanitize_stem("report.pdf"), "report");
    assert_eq!(sanitize_stem("../../etc/passwd.pdf"), "passwd");
    assert_eq!(sanitize_stem("C:\\docs\\Q3 plan (final).pdf"), "Q3_plan_final");
    assert_eq!(sanitize_stem(".pdf"), "pdf");
    assert_eq!(sanitize_stem("???.pdf"), "file");
    assert_eq!(sanitize_stem("ﬁle.pdf"), "file");
    assert_eq!(sanitize_stem(&"x".repeat(200)).len(), 80);
}

#[test]
fn page_names_are_scoped_by_job() {
    let a = Job::new(vec![InputFile::pdf("a.pdf", b"%PDF-".to_vec())]);
    let b = Job::new(vec![InputFile::pdf("a.pdf", b"%PDF-".to_vec())]);
    assert_ne!(a.id, b.id);

    let name = a.context().page_file_name(0, "a.pdf", 3);
    assert_eq!(name, format!("{}-0-a-page3.png", a.id.simple()));
    assert_ne!(name, b.context().page_file_name(0, "a.pdf", 3));
    assert_ne!(name, a.context().page_file_name(0, "a.pdf", 4));
}

#[test]
fn colliding_stems_in_one_job_get_distinct_names() {
    let job = Job::new(Vec::new());
    let ctx = job.context();
    assert_eq!(sanitize_stem("a b.pdf"), sanitize_stem("a_b.pdf"));
    assert_ne!(
        ctx.page_file_name(0, "a b.pdf", 1),
        ctx.page_file_name(1, "a_b.pdf", 1)
    );
    assert_ne!(
        ctx.page_file_name(0, "x.pdf", 1),
        ctx.page_file_name(1, "x.PDF", 1)
    );
}

#[test]
fn pdf_signature() {
    assert!(looks_like_pdf(b"%PDF-1.7\n"));
    assert!(!looks_like_pdf(b"%PD"));
    assert!(!looks_like_pdf(b"\x89PNG"));
}
