use framerelay::PipelineError;

fn label(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::Precondition(_) => "precondition",
        PipelineError::Seek(_) => "seek",
        PipelineError::Render(_) => "render",
        PipelineError::InvalidFrame(_) => "frame",
        PipelineError::BatchUpload { .. } => "transport",
        PipelineError::Finalize(_) => "encode",
        PipelineError::ArtifactUpload(_) => "store",
        PipelineError::Http(_) => "http",
        PipelineError::Io(_) => "io",
        PipelineError::Config(_) => "config",
        PipelineError::UsageDenied(_) => "usage",
    }
}

#[test]
fn every_error_kind_renders_its_context() {
    let cases = [
        (PipelineError::Seek("stalled".into()), "seek failure: stalled"),
        (
            PipelineError::BatchUpload {
                batch: 1,
                total: 3,
                reason: "Batch upload failed (500)".into(),
            },
            "batch 1 of 3 upload failed: Batch upload failed (500)",
        ),
        (
            PipelineError::Finalize("missing batch 1".into()),
            "encode failure: missing batch 1",
        ),
        (
            PipelineError::UsageDenied("limit reached".into()),
            "usage denied: limit reached",
        ),
    ];
    for (error, rendered) in cases {
        assert_eq!(error.to_string(), rendered, "{}", label(&error));
    }
}

#[test]
fn io_errors_convert_into_pipeline_errors() {
    let err: PipelineError =
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only downloads").into();
    assert_eq!(label(&err), "io");
    assert_eq!(err.to_string(), "I/O failure: read-only downloads");
}
