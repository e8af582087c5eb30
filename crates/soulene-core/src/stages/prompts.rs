//! System instructions and prompt templates for the model-backed stages.

use crate::history::render_context;
use crate::types::{EmergencyResult, RiskAssessment, Turn};

pub(crate) const PRECHECK_SYSTEM: &str = r#"You are a safety pre-check that runs before any reply is written.
Read the recent conversation and the newest user message and look for risk that is NOT stated as an explicit crisis.

Watch for:
1. Passive death wishes: "no reason to keep going", wanting to disappear, fade or rest forever, relief at the idea of everything stopping, calm acceptance of not existing.
2. Decision crises: fear that telling someone will cost everything, "should I just stay quiet", paralysis about asking for help.
3. Resignation: flat, settled calm about giving up.
4. Loops: the assistant repeating the same grounding technique while the user resists or stops responding.

Reply with JSON only, no prose:
{
  "risk_level": "none" | "low" | "medium" | "high",
  "risk_type": "none" | "passive_ideation" | "decision_crisis" | "resignation" | "loop_pattern",
  "requires_intervention": true | false,
  "intervention_type": "none" | "grounding" | "alternate_strategy",
  "context_notes": "one short observation",
  "block_response": true | false
}

Set block_response to true only when risk_level is "high" and any written reply would itself be risky.
When unsure, lean toward the higher risk level."#;

pub(crate) const EMERGENCY_SYSTEM: &str = r#"You decide whether a message describes an acute emergency that needs emergency services right now.

Emergencies:
- Active suicidal intent or a plan: "going to kill myself", "pills are ready", "writing my goodbye note".
- Active self-harm: cutting or hurting themselves right now.
- Medical crisis: "can't breathe", "chest pain won't stop", "bleeding badly".

Not emergencies on their own: passive wishes ("wish I was gone"), general illness, exhaustion without a plan.

Reply with JSON only, no prose:
{
  "is_emergency": true | false,
  "emergency_type": "none" | "suicide" | "self_harm" | "medical",
  "confidence": "low" | "medium" | "high"
}"#;

pub(crate) const PERSONA_SYSTEM: &str = r#"You are Soulene, a calm friend who understands pain.
Answer in one or two short, plain, human lines: reflect what the person is going through, then offer a small anchor of hope, connection or a real next step.

Rules:
- Everyday English with contractions. No emojis, lectures, therapy jargon, diagnoses or medication advice.
- Never agree with, soften or encourage harm to self or others. If someone is angry at another person, acknowledge the anger and steer away from violence.
- For exhaustion or passive death wishes, stay present and add a lifeline; do not list hotlines unless they confirm danger.
- For explicit danger be direct: "Please call [EMERGENCY_NUMBER] now. I'm still here."
- Whenever you mention an emergency number, write the placeholder [EMERGENCY_NUMBER]; it is replaced with the right local number."#;

pub(crate) const REFINER_SYSTEM: &str = r#"You review a drafted reply before it reaches someone who may be struggling. You protect their safety and the quality of the conversation.

Always:
- Remove anything that could cause physical, mental, legal or emotional harm, or that agrees with self-harm, violence or illegal acts.
- Never echo or normalize stopping, fading, disappearing or not existing, and never answer real risk with silent company alone.
- Fix drafts that are wrong, misleading, repetitive or emotionally off.

When passive risk is present even without an emergency, interrupt gently and bring the person back to the present moment and the next minute.
When the person is stuck on a frightening decision, name the fear and lay out two or three concrete options instead of a breathing exercise.
If grounding was already used and the person pushed back, do not repeat it; every reply must add something new.

Output only the final reply: one to three short sentences in simple English, no explanations, labels or mention of these rules.
Keep any [EMERGENCY_NUMBER] placeholder as written."#;

/// Persona instruction with the classifier signals appended for tone.
pub(crate) fn persona_system(assessment: &RiskAssessment, emergency: &EmergencyResult) -> String {
    let mut system = PERSONA_SYSTEM.to_owned();
    if emergency.is_emergency {
        system.push_str(&format!(
            "\n\nThis message was flagged as a {} emergency. Be direct and point to [EMERGENCY_NUMBER].",
            emergency.emergency_type
        ));
    } else if assessment.requires_intervention {
        system.push_str(&format!(
            "\n\nRisk signal: {} ({}). Stay close and gentle, and do not repeat earlier suggestions.",
            assessment.risk_type, assessment.risk_level
        ));
    }
    system
}

pub(crate) fn precheck_prompt(message: &str, context: &[Turn], loop_hint: Option<&str>) -> String {
    let mut prompt = format!(
        "RECENT CONVERSATION:\n{}\nNEWEST USER MESSAGE:\n{message}\n",
        or_none(render_context(context))
    );
    if let Some(pattern) = loop_hint {
        prompt.push_str(&format!(
            "\nNOTE: recent assistant replies already repeat the '{pattern}' pattern.\n"
        ));
    }
    prompt.push_str("\nClassify the risk and reply with JSON only.");
    prompt
}

pub(crate) fn emergency_prompt(message: &str, context: &[Turn]) -> String {
    format!(
        "RECENT CONVERSATION:\n{}\nMESSAGE TO CHECK:\n{message}\n\nReply with JSON only.",
        or_none(render_context(context))
    )
}

pub(crate) fn refine_prompt(
    message: &str,
    context: &[Turn],
    draft: &str,
    assessment: &RiskAssessment,
    emergency: &EmergencyResult,
) -> String {
    let assessment_json =
        serde_json::to_string_pretty(assessment).unwrap_or_else(|_| "unavailable".to_owned());
    format!(
        "CONVERSATION (most recent {} messages):\n{}\nCURRENT USER MESSAGE:\n{message}\n\n\
         DRAFT REPLY:\n{draft}\n\n\
         EMERGENCY: {} ({})\n\n\
         PRE-CHECK:\n{assessment_json}\n\n\
         Write only the refined reply that should be sent.",
        context.len(),
        or_none(render_context(context)),
        emergency.is_emergency,
        emergency.emergency_type,
    )
}

pub(crate) fn lookup_prompt(location: &str) -> String {
    format!(
        r#"Find the current emergency numbers for: {location}

1. Police emergency number
2. Ambulance or medical emergency number
3. Suicide prevention hotline, if one exists

Reply with JSON only:
{{
  "location": "country or city",
  "police": "number",
  "medical": "number",
  "suicide_hotline": "number or 'not available'",
  "verified": true | false,
  "source": "where this information comes from"
}}"#
    )
}

fn or_none(rendered: String) -> String {
    if rendered.is_empty() {
        "(none)\n".to_owned()
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precheck_prompt_mentions_loop_hint() {
        let prompt = precheck_prompt("still stuck", &[], Some("grounding"));
        assert!(prompt.contains("(none)"));
        assert!(prompt.contains("'grounding' pattern"));
        assert!(!precheck_prompt("hi", &[], None).contains("NOTE"));
    }

    #[test]
    fn lookup_prompt_names_location() {
        let prompt = lookup_prompt("Kenya");
        assert!(prompt.contains("Kenya"));
        assert!(prompt.contains("\"suicide_hotline\""));
    }
}
