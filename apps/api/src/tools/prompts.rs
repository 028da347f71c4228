// All prompt constants for the four tools, one fixed template per tool.
// Substitution is literal `{name}` replacement via `template::render`.

use crate::chat_client::ModelConfig;

/// Cover letter generation. Required: {job_description}, {resume_text}.
/// Output contract: 300–450 word business-letter prose.
pub const COVER_LETTER_TEMPLATE: &str = r#"Write a professional, compelling cover letter (300-450 words) tailored specifically to the job description below.
Emphasize the candidate's most relevant experience, skills, achievements and qualifications that directly match or exceed the job requirements.
Use concrete examples from the resume where possible.
Show enthusiasm for the role and company without fabricating information.

Structure the letter in standard business format:
- Header (date, employer's contact if known, or just salutation)
- Opening paragraph: state the position and how you found it + brief why you're a strong fit
- 1-2 body paragraphs: highlight strongest matching qualifications with evidence
- Closing paragraph: reiterate interest, call to action, thanks

Job Description:
{job_description}

Candidate's Resume:
{resume_text}

Do not invent any experience, skills or facts not present in the resume."#;

pub const COVER_LETTER_CONFIG: ModelConfig = ModelConfig {
    temperature: 0.3,
    max_tokens: 1500,
};

/// Standalone résumé evaluation. Required: {resume_text}.
/// Output contract: the six numbered sections, in order.
pub const CHECKER_TEMPLATE: &str = r#"You are an advanced resume evaluation assistant. Analyze the provided resume text and
score it out of 100 based on the following criteria: clarity, relevance, format, comprehensiveness, and keywords/ATS-friendliness.

Your response MUST follow this exact structure:

1. **Score**: X/100
2. **Strengths**:
   - point one
   - point two
   - point three (minimum 3)
3. **Weaknesses / Areas for Improvement**:
   - point one
   - point two
   - point three (minimum 3)
4. **Skills Explicitly Mentioned**:
   - skill 1
   - skill 2
   ...
5. **Recommended Additional Skills**: (to make the resume stronger / more ATS-friendly / future-proof)
   - suggestion 1
   - suggestion 2
   ...
6. **Suggested Next Career Steps / Roles**:
   - realistic next role 1
   - realistic next role 2
   - longer-term direction (optional)

Be specific, honest, constructive and professional.
Resume text:
{resume_text}"#;

pub const CHECKER_CONFIG: ModelConfig = ModelConfig {
    temperature: 0.1,
    max_tokens: 2000,
};

/// Résumé-vs-JD match scoring. Required: {job_description}, {resume_text}.
/// Output contract: the exact headed report structure below.
pub const MATCHER_TEMPLATE: &str = r#"You are an expert resume scorer and ATS optimization specialist with deep knowledge of recruitment practices across industries.

Task: Carefully analyze how well the candidate's resume matches the job description below. Base EVERY statement, score, and suggestion strictly and exclusively on the content actually present in the provided resume and job description. Do NOT invent, assume, or add any experience, skills, tools, achievements, or facts that are not explicitly written in the resume.

Job Description:
{job_description}

Candidate's Resume:
{resume_text}

Produce the analysis using exactly the following structure and headings (do not add/remove sections, do not change headings):

Score: [integer]/100
Overall Match: [integer]%

Keywords matched:
- [bullet list of important keywords/phrases from the JD that DO appear in the resume]

Missing keywords:
- [bullet list of important/hard-required keywords/phrases from the JD that are absent or extremely weakly represented in the resume]

Readability Score: [integer]/100
ATS Compatibility Score: [integer]/100

2-liner summary:
[One strong, concise sentence summarizing the overall fit]
[One strong, concise sentence naming the single biggest current weakness]

Skill gap analysis:
- [Clear skill/tool/experience gaps, phrased as "Missing / weak: X -> needed for Y part of the role"]
- Focus on the most impactful gaps only (4-8 bullets max)

Overall improvement suggestions:
- [Prioritized, actionable bullet points, strongest bang-for-buck improvements first]
- Include both content (what to add/strengthen) and formatting/ATS tips

Industry specific feedback:
- [2-5 bullets with observations tailored to this role's industry / function. Only include points that are genuinely relevant to the JD]

Scoring rubrics to follow (use your judgment applying these):
- Score (0-100): weighted combination of keyword presence, skill relevance, experience recency and level, achievements quantification, role progression
- Overall Match %: rough estimated chance of passing initial ATS + recruiter screen
- Readability: clarity, grammar, formatting, length, action verbs, density of fluff
- ATS Compatibility: presence of standard section headings, keyword density (not stuffing), no tables/graphics, machine-readable layout cues

Be honest, direct, and constructive. If the match is very poor, say so clearly."#;

pub const MATCHER_CONFIG: ModelConfig = ModelConfig {
    temperature: 0.2,
    max_tokens: 2200,
};

/// Standing system instruction for the career-coach chat. The résumé is
/// embedded here once; the live conversation follows as user/assistant turns.
const COACH_SYSTEM_TEMPLATE: &str = r#"You are a professional career coach and resume mentor.

You help with:
- Career Guidance
- Resume Improvements
- Interview Preparation
- Job Search Strategy
- Skill Gap Analysis

Candidate Resume:
{resume_text}"#;

pub const COACH_CONFIG: ModelConfig = ModelConfig {
    temperature: 0.2,
    max_tokens: 2000,
};

/// Renders the coach system instruction for a given résumé.
/// Infallible: callers have already established the résumé is non-empty.
pub fn coach_system(resume_text: &str) -> String {
    COACH_SYSTEM_TEMPLATE.replace("{resume_text}", resume_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coach_system_embeds_resume_verbatim() {
        let rendered = coach_system("Jane Doe\nSoftware Engineer");
        assert!(rendered.contains("Jane Doe\nSoftware Engineer"));
        assert!(!rendered.contains("{resume_text}"));
    }
}
