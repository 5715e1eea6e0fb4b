//! Prompt Construction
//!
//! Section-based prompt builder plus the chunk prompt seam used by
//! `ChunkedGenerationCoordinator`. Applications with their own templates
//! implement `ChunkPromptBuilder`; `SubjectExtractionPrompt` is the default.

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered objectives
    Objectives(Vec<String>),
    /// Bulleted list with a header; omitted when empty
    List { header: String, items: Vec<String> },
    /// Raw text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
    /// Expected JSON output shape
    OutputSchema(String),
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    pub fn objectives(mut self, objectives: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(String::from).collect(),
        ));
        self
    }

    pub fn list(mut self, header: &str, items: &[String]) -> Self {
        self.sections.push(PromptSection::List {
            header: header.to_string(),
            items: items.to_vec(),
        });
        self
    }

    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    pub fn output_schema(mut self, schema: &str) -> Self {
        self.sections
            .push(PromptSection::OutputSchema(schema.to_string()));
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n",
                        expertise, task
                    ));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::List { header, items } => {
                    if items.is_empty() {
                        continue;
                    }
                    prompt.push_str(&format!("# {}\n\n", header));
                    for item in items {
                        prompt.push_str(&format!("- {}\n", item));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::OutputSchema(schema) => {
                    prompt.push_str("<OUTPUT>\n");
                    prompt.push_str("Respond with JSON only, matching:\n");
                    prompt.push_str(&schema);
                    prompt.push_str("\n</OUTPUT>\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

// =============================================================================
// Chunk Prompts
// =============================================================================

/// Builds the prompt for one slice of a document
pub trait ChunkPromptBuilder: Send + Sync {
    /// `chunk_index` is zero-based; `known_items` holds every name discovered
    /// so far, including the caller's pre-existing items.
    fn build(
        &self,
        content: &str,
        known_items: &[String],
        language: Option<&str>,
        chunk_index: usize,
        total_chunks: usize,
    ) -> String;
}

/// Default prompt for pulling study subjects out of course material
#[derive(Debug, Clone, Default)]
pub struct SubjectExtractionPrompt;

impl ChunkPromptBuilder for SubjectExtractionPrompt {
    fn build(
        &self,
        content: &str,
        known_items: &[String],
        language: Option<&str>,
        chunk_index: usize,
        total_chunks: usize,
    ) -> String {
        let mut builder = PromptBuilder::new()
            .role("curriculum analyst", "identifying study subjects in course material")
            .objectives(vec![
                "Identify the distinct subjects a student would study in the material",
                "Give each subject a short name and a one-sentence description",
                "Skip subjects already listed as known",
            ])
            .list("Known Subjects", known_items);

        if total_chunks > 1 {
            builder = builder.text(&format!(
                "This is part {} of {} of a longer document.",
                chunk_index + 1,
                total_chunks
            ));
        }

        builder = builder.section("Material", content);
        if let Some(language) = language {
            builder = builder.text(&format!("Write names and descriptions in {}.", language));
        }

        builder
            .output_schema(r#"{"subjects": [{"name": "string", "description": "string"}]}"#)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sections_in_order() {
        let prompt = PromptBuilder::new()
            .role("tutor", "algebra")
            .objectives(vec!["first", "second"])
            .section("Notes", "body")
            .build();

        let role = prompt.find("<ROLE>").unwrap();
        let objectives = prompt.find("2. second").unwrap();
        let notes = prompt.find("# Notes").unwrap();
        assert!(role < objectives && objectives < notes);
        assert!(prompt.ends_with("body"));
    }

    #[test]
    fn test_empty_list_omitted() {
        let prompt = PromptBuilder::new().list("Known", &[]).text("x").build();
        assert!(!prompt.contains("Known"));
    }

    #[test]
    fn test_subject_prompt_carries_known_items() {
        let known = vec!["Algebra".to_string(), "Geometry".to_string()];
        let prompt = SubjectExtractionPrompt.build("chapter text", &known, Some("French"), 1, 3);

        assert!(prompt.contains("- Algebra\n- Geometry"));
        assert!(prompt.contains("part 2 of 3"));
        assert!(prompt.contains("chapter text"));
        assert!(prompt.contains("in French"));
        assert!(prompt.contains("\"subjects\""));
    }

    #[test]
    fn test_single_chunk_prompt_has_no_part_marker() {
        let prompt = SubjectExtractionPrompt.build("text", &[], None, 0, 1);
        assert!(!prompt.contains("part 1"));
        assert!(!prompt.contains("Known Subjects"));
    }
}
