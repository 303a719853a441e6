/// Descriptions are cut to this many characters before going into the prompt.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Field-extraction prompt for one conference.
pub fn build_prompt(title: &str, location: &str, description: &str) -> String {
    let description = ai_client::truncate_chars(description, MAX_DESCRIPTION_CHARS);
    format!(
        r#"You are a JSON data extractor. Analyze the conference description and extract information. You MUST respond with ONLY valid JSON in this exact format:

{{
  "Submission Deadline": "",
  "Submission Fee": "",
  "Registration Fee": "",
  "Continent": ""
}}

EXTRACTION RULES:
1. Submission Deadline: Find submission/paper deadlines. Format as YYYY/MM/DD (e.g., 2025/12/31). Use "" if not found.

2. Submission Fee: Find submission/application fees. Include currency and amount (e.g., "$50", "€75"). Use "" if not mentioned or free.

3. Registration Fee: Find conference/registration fees. Include currency and amount (e.g., "$400", "€300"). Use "" if not mentioned.

4. Continent: Based on location, return exactly one of: Asia, Australia, Europe, North America, South America, Africa. Use geographical knowledge.

Conference Data:
Title: {title}
Location: {location}
Description: {description}

CRITICAL: Return ONLY the JSON object with the four fields above. No explanations, no additional text, no markdown formatting."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_interpolates_and_bounds_description() {
        let long = "d".repeat(5000);
        let prompt = build_prompt("Asset Pricing Forum", "Tokyo, Japan", &long);
        assert!(prompt.contains("Title: Asset Pricing Forum\n"));
        assert!(prompt.contains("Location: Tokyo, Japan\n"));
        assert!(prompt.contains(&format!("Description: {}\n", "d".repeat(MAX_DESCRIPTION_CHARS))));
        assert!(!prompt.contains(&"d".repeat(MAX_DESCRIPTION_CHARS + 1)));
        assert!(prompt.contains("\"Submission Deadline\": \"\""));
    }
}
