use crate::artifact::CompiledArtifact;

pub(super) fn compile(source: &str) -> CompiledArtifact {
    CompiledArtifact::with_body(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_is_the_text() {
        let artifact = compile("<h1>hi</h1>");
        assert_eq!(artifact.body, "<h1>hi</h1>");
        assert!(artifact.head.is_empty());
        assert!(artifact.scripts.is_empty());
    }
}
