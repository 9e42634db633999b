use crate::audit;
use crate::content::{ContentType, Subject, VoiceProfile, WorkItem};
use crate::services::PromptBuilder;

/// Plain-template prompt builder.
#[derive(Debug, Clone, Default)]
pub struct TemplatePromptBuilder {
    /// Station name woven into every prompt.
    pub station: String,
}

impl TemplatePromptBuilder {
    pub fn new(station: &str) -> Self {
        Self {
            station: station.to_string(),
        }
    }

    fn task(&self, item: &WorkItem) -> String {
        let subject = describe(&item.subject);
        match item.content_type {
            ContentType::SongIntro => format!(
                "Write a short spoken introduction for {}. \
                 Build anticipation and end right before the song starts. 2-4 sentences.",
                subject
            ),
            ContentType::SongOutro => format!(
                "Write a short spoken outro for {}, which just finished playing. \
                 Refer to it in the past tense. 1-3 sentences.",
                subject
            ),
            ContentType::Time => format!("Announce the time: {}. One or two brief sentences.", subject),
            ContentType::Weather => format!(
                "Introduce the weather report for {}. Keep the forecast itself out; \
                 hint at the weather subtly. 1-3 sentences.",
                subject
            ),
        }
    }
}

fn describe(subject: &Subject) -> String {
    match subject {
        Subject::Song { artist, title } => format!("the song \"{}\" by {}", title, artist),
        Subject::Slot { hour, minute } => clock(*hour, minute.unwrap_or(0)),
    }
}

fn clock(hour: u8, minute: u8) -> String {
    let (h12, suffix) = match hour {
        0 => (12, "AM"),
        1..=11 => (hour, "AM"),
        12 => (12, "PM"),
        _ => (hour - 12, "PM"),
    };
    format!("{}:{:02} {}", h12, minute, suffix)
}

fn exemplar_block(voice: &VoiceProfile) -> String {
    if voice.exemplars.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = voice
        .exemplars
        .iter()
        .map(|e| format!("- \"{}\"", e.trim()))
        .collect();
    format!("Examples of this voice:\n{}\n", lines.join("\n"))
}

impl PromptBuilder for TemplatePromptBuilder {
    fn generation_prompt(&self, item: &WorkItem, voice: &VoiceProfile, feedback: Option<&str>) -> String {
        let mut prompt = format!(
            "You are {}, a radio host on {}.\n",
            voice.name,
            if self.station.is_empty() { "the station" } else { self.station.as_str() }
        );
        if !voice.style.is_empty() {
            prompt.push_str(&format!("Style: {}\n", voice.style));
        }
        prompt.push_str(&exemplar_block(voice));
        prompt.push_str(&self.task(item));
        prompt.push_str("\nReply with the spoken words only.");
        if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
            prompt.push_str("\n\nA previous attempt was rejected by review. Fix these problems:\n");
            prompt.push_str(feedback.trim());
        }
        prompt
    }

    fn audit_prompt(&self, item: &WorkItem, voice: &VoiceProfile, script: &str) -> String {
        let criteria: Vec<String> = audit::criteria(item.content_type)
            .iter()
            .map(|c| format!("\"{}\": <1-10>", c))
            .collect();
        format!(
            "You review radio scripts for the voice {}.\n{}{}\
             Task given to the writer: {}\n\nScript:\n\"\"\"\n{}\n\"\"\"\n\n\
             Score each criterion from 1 to 10 and answer with JSON only:\n\
             {{\"criteria_scores\": {{{}}}, \"issues\": [<strings>], \"notes\": <string>}}",
            voice.name,
            if voice.style.is_empty() { String::new() } else { format!("Style: {}\n", voice.style) },
            exemplar_block(voice),
            self.task(item),
            script.trim(),
            criteria.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice() -> VoiceProfile {
        VoiceProfile {
            name: "julie".to_string(),
            style: "warm, hopeful".to_string(),
            exemplars: vec!["Hey there, friends!".to_string()],
            marker_words: Vec::new(),
        }
    }

    #[test]
    fn clock_formats_twelve_hour() {
        assert_eq!(clock(0, 5), "12:05 AM");
        assert_eq!(clock(12, 0), "12:00 PM");
        assert_eq!(clock(15, 30), "3:30 PM");
    }

    #[test]
    fn generation_prompt_includes_feedback_only_when_given() {
        let builder = TemplatePromptBuilder::new("Radio 1047");
        let item = WorkItem::song(ContentType::SongIntro, "Ink Spots", "Maybe").unwrap();
        let plain = builder.generation_prompt(&item, &voice(), None);
        assert!(plain.contains("\"Maybe\" by Ink Spots"));
        assert!(plain.contains("Hey there, friends!"));
        assert!(!plain.contains("rejected"));

        let retry = builder.generation_prompt(&item, &voice(), Some("Issues: too modern"));
        assert!(retry.contains("Issues: too modern"));
    }

    #[test]
    fn audit_prompt_lists_content_type_criteria() {
        let builder = TemplatePromptBuilder::default();
        let item = WorkItem::slot(ContentType::Weather, Some(8), None).unwrap();
        let prompt = builder.audit_prompt(&item, &voice(), "Grab an umbrella, folks.");
        assert!(prompt.contains("\"subtlety\": <1-10>"));
        assert!(!prompt.contains("era_appropriateness"));
        assert!(prompt.contains("Grab an umbrella"));
    }

    #[test]
    fn task_covers_every_content_type() {
        let builder = TemplatePromptBuilder::default();
        let outro = WorkItem::song(ContentType::SongOutro, "Ink Spots", "Maybe").unwrap();
        assert!(builder.task(&outro).contains("past tense"));
        assert!(builder.task(&outro).contains("\"Maybe\" by Ink Spots"));
        let time = WorkItem::slot(ContentType::Time, Some(15), Some(30)).unwrap();
        assert!(builder.task(&time).contains("3:30 PM"));
        let weather = WorkItem::slot(ContentType::Weather, Some(6), None).unwrap();
        assert!(builder.task(&weather).contains("6:00 AM"));
    }
}
