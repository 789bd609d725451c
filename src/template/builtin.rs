//! Shipped prompt bodies.
//!
//! Transcription prompts ask for one line per utterance in the format the
//! transcript parser reads: `[mm:ss - mm:ss] Speaker A: text`.

use crate::template::TemplateCategory;

const MULTI_SPEAKER: &str = "\
You are a professional transcriptionist. Transcribe the attached audio verbatim.

This is segment {segment_index} of {segment_count}, covering {segment_start} to {segment_end} \
of the full recording. Timestamps must be relative to the start of this segment.

Identify the distinct speakers and label them Speaker A, Speaker B, and so on. Labels only \
need to be consistent within this segment.

Write one line per utterance and nothing else:
[mm:ss - mm:ss] Speaker A: spoken text

Keep filler words out, keep numbers and names exactly as spoken, and do not summarize.";

const SINGLE_SPEAKER: &str = "\
You are a professional transcriptionist. Transcribe the attached audio verbatim.

This is segment {segment_index} of {segment_count}, covering {segment_start} to {segment_end} \
of the full recording. Timestamps must be relative to the start of this segment.

Do not attempt to distinguish speakers. Write one line per sentence and nothing else:
[mm:ss - mm:ss] spoken text";

const OPTIMIZATION: &str = "\
Below is a machine-generated transcript. Improve its readability without changing its meaning:
fix punctuation, remove filler words and false starts, and correct obvious recognition errors.

Keep every line's timestamp and speaker label exactly as they are, keep the header lines
unchanged, and do not merge, reorder or drop lines.

Transcript:
{transcript}";

const CUSTOMER_INTERVIEW: &str = "\
You are a senior business analyst. Analyze the following customer interview.

{coverage_note}

Produce a structured report in Markdown with these sections:
1. Customer background: organisation, roles present, current situation.
2. Needs: explicit and implicit requirements, each with supporting quotes.
3. Pain points: ranked by severity and business impact.
4. Decision chain: who decides, who influences, budget and timeline signals.
5. Opportunity assessment: fit, size, risks, and recommended next steps.

Transcript:
{transcript}";

const BUSINESS_NEGOTIATION: &str = "\
You are an experienced negotiation advisor. Analyze the following business negotiation.

{coverage_note}

Produce a structured report in Markdown with these sections:
1. Key terms: every term discussed and where each side stands.
2. Positions and interests: stated positions versus underlying interests per party.
3. Concessions: what was offered, what was accepted, what remains open.
4. Risks: commercial, legal and relationship risks raised or implied.
5. Recommended strategy for the next round.

Transcript:
{transcript}";

const INTERNAL_MEETING: &str = "\
You are a chief of staff. Analyze the following internal meeting.

{coverage_note}

Produce a structured report in Markdown with these sections:
1. Summary: purpose and outcome in a few sentences.
2. Decisions: each decision with its rationale.
3. Action items: task, owner, deadline (write \"unassigned\" when no owner was named).
4. Open questions and disagreements.
5. Follow-up schedule.

Transcript:
{transcript}";

const REQUIREMENTS_GATHERING: &str = "\
You are a product manager. Analyze the following requirements discussion.

{coverage_note}

Produce a structured report in Markdown with these sections:
1. Functional requirements, each as a user story with acceptance criteria.
2. Non-functional requirements: performance, security, compliance, integration.
3. Priorities: must have, should have, could have.
4. Implementation difficulty and dependencies per requirement.
5. Ambiguities that need clarification with the stakeholders.

Transcript:
{transcript}";

const PROJECT_REVIEW: &str = "\
You are a delivery lead running a retrospective. Analyze the following project review.

{coverage_note}

Produce a structured report in Markdown with these sections:
1. Project recap: goals, scope and actual outcome.
2. What went well and why.
3. Problems and lessons learned, with root causes.
4. Improvement suggestions with owners where mentioned.
5. Best practices worth reusing on future projects.

Transcript:
{transcript}";

const PROJECT_PROPOSAL: &str = "\
You are a solutions consultant writing a formal project proposal for a client.

Client profile:
{client_profile}

Our capabilities and reference material:
{capability_docs}

Analysis of the client's situation:
{analysis_report}

Write the proposal in Markdown with these sections: Executive summary, Requirements \
analysis, Proposed solution, Implementation plan with milestones, Return on investment, \
Team, Commercial terms. Ground every claim about our capabilities in the material above \
and do not invent prices that were not provided.";

const QUOTATION_PROPOSAL: &str = "\
You are a pre-sales engineer preparing a commercial quotation.

Client profile:
{client_profile}

Our capabilities and price references:
{capability_docs}

Analysis of the client's needs:
{analysis_report}

Write the quotation in Markdown with these sections: Overview, Scope of services, \
Itemised pricing as a table (item, description, quantity, unit price, subtotal), Payment \
terms, Service commitments. Mark any price not backed by the material above as \"to be \
confirmed\".";

const SOLUTION_BRIEF: &str = "\
You are a solutions consultant. Write a one-page solution brief.

Client profile:
{client_profile}

Our capabilities:
{capability_docs}

Analysis of the client's needs:
{analysis_report}

Use Markdown with four short sections: Problem statement, Solution, Implementation \
steps, Expected results. Keep it under 500 words.";

/// `(category, name, body)` for every shipped template.
pub const TEMPLATES: &[(TemplateCategory, &str, &str)] = &[
    (TemplateCategory::Transcription, "multi_speaker", MULTI_SPEAKER),
    (TemplateCategory::Transcription, "single_speaker", SINGLE_SPEAKER),
    (TemplateCategory::Transcription, "optimization", OPTIMIZATION),
    (TemplateCategory::Analysis, "customer_interview", CUSTOMER_INTERVIEW),
    (TemplateCategory::Analysis, "business_negotiation", BUSINESS_NEGOTIATION),
    (TemplateCategory::Analysis, "internal_meeting", INTERNAL_MEETING),
    (TemplateCategory::Analysis, "requirements_gathering", REQUIREMENTS_GATHERING),
    (TemplateCategory::Analysis, "project_review", PROJECT_REVIEW),
    (TemplateCategory::Proposal, "project_proposal", PROJECT_PROPOSAL),
    (TemplateCategory::Proposal, "quotation_proposal", QUOTATION_PROPOSAL),
    (TemplateCategory::Proposal, "solution_brief", SOLUTION_BRIEF),
];
