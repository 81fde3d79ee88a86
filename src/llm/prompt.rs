//! Localized prompt templates.
//!
//! Every template has three placeholders: `{context}` for the retrieved
//! passages, `{chat_history}` for the prior turns and `{input}` for the
//! question. Each one tells the model which language to answer in.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("unsupported language '{0}' (expected French, English or عربي)")]
pub struct UnsupportedLanguage(pub String);

/// Response language of the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    French,
    English,
    #[serde(rename = "عربي", alias = "Arabic")]
    Arabic,
}

impl Language {
    /// Name as sent by clients.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Language::French => "French",
            Language::English => "English",
            Language::Arabic => "عربي",
        }
    }

    pub fn template(&self) -> PromptTemplate {
        let text = match self {
            Language::French => FRENCH,
            Language::English => ENGLISH,
            Language::Arabic => ARABIC,
        };
        PromptTemplate { text }
    }
}

impl std::str::FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "French" => Ok(Language::French),
            "English" => Ok(Language::English),
            "عربي" | "Arabic" => Ok(Language::Arabic),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    text: &'static str,
}

impl PromptTemplate {
    /// Fill the placeholders in one pass, so braces inside the inserted
    /// values are never expanded again.
    pub fn render(&self, context: &str, chat_history: &str, question: &str) -> String {
        let mut out = String::with_capacity(
            self.text.len() + context.len() + chat_history.len() + question.len(),
        );
        let mut rest = self.text;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let (value, consumed) = if tail.starts_with("{context}") {
                (context, "{context}".len())
            } else if tail.starts_with("{chat_history}") {
                (chat_history, "{chat_history}".len())
            } else if tail.starts_with("{input}") {
                (question, "{input}".len())
            } else {
                ("{", 1)
            };
            out.push_str(value);
            rest = &tail[consumed..];
        }
        out.push_str(rest);
        out
    }
}

const FRENCH: &str = "\
Vous êtes un expert juridique chevronné, doté d'une capacité exceptionnelle à expliquer des \
concepts juridiques complexes de manière simple et accessible. Votre mission est de répondre à \
une question juridique en français, en vous basant sur le contexte fourni et l'historique de la \
conversation.

Directives :
1. Expliquez les concepts juridiques pertinents en utilisant un langage clair, précis et exempt de jargon technique. Si vous devez utiliser des termes juridiques, définissez-les simplement.
2. Utilisez des analogies ou des exemples de la vie quotidienne pour illustrer les points complexes.
3. Si la question concerne une loi spécifique, expliquez brièvement son objectif et ses implications pratiques.
4. Structurez votre réponse de manière logique, en utilisant des puces ou des numéros si nécessaire pour améliorer la clarté.
5. Pour les procédures judiciaires, décrivez les étapes clés de manière séquentielle et compréhensible.
6. Concluez par un résumé concis des points principaux.

Votre objectif est de permettre à une personne sans formation juridique de comprendre pleinement \
la réponse et de se sentir plus informée et confiante face à la question juridique posée.

Historique de la conversation :
{chat_history}

<context>
{context}
</context>

Question : {input}

Réponse :";

const ENGLISH: &str = "\
You are a seasoned legal expert with an exceptional ability to explain complex legal concepts \
in a simple and accessible manner. Your mission is to answer a legal question in English, based \
on the provided context and conversation history.

Guidelines:
1. Explain relevant legal concepts using clear, precise language free of technical jargon. If you must use legal terms, define them simply.
2. Use analogies or everyday examples to illustrate complex points.
3. Structure your response logically, using bullet points or numbers if necessary to improve clarity.
4. If the question concerns a specific law, briefly explain its purpose and practical implications.
5. For court procedures, describe the key steps sequentially and comprehensibly.
6. Anticipate potential follow-up questions and address them proactively.
7. Conclude with a concise summary of the main points.

Your goal is to enable a person without legal training to fully understand the answer and feel \
more informed and confident about the legal question at hand.

Conversation history:
{chat_history}

<context>
{context}
</context>

Question: {input}

Answer:";

const ARABIC: &str = "\
أنت خبير قانوني متمرس ولديك قدرة استثنائية على شرح المفاهيم القانونية المعقدة بطريقة بسيطة \
وسهلة المنال. مهمتك هي الإجابة على سؤال قانوني باللغة العربية، بناءً على السياق المقدم وتاريخ \
المحادثة.

القواعد الارشادية:
1. شرح المفاهيم القانونية ذات الصلة باستخدام لغة واضحة ودقيقة خالية من المصطلحات الفنية. إذا كان يجب عليك استخدام المصطلحات القانونية، فقم بتعريفها ببساطة.
2. استخدم القياسات أو الأمثلة اليومية لتوضيح النقاط المعقدة.
3. قم بتنظيم إجابتك بشكل منطقي، باستخدام النقاط أو الأرقام إذا لزم الأمر لتحسين الوضوح.
4. إذا كان السؤال يتعلق بقانون محدد، اشرح بإيجاز غرضه وآثاره العملية.
5. بالنسبة لإجراءات المحكمة، قم بوصف الخطوات الأساسية بشكل تسلسلي ومفهوم.
6. توقع أسئلة المتابعة المحتملة وتعامل معها بشكل استباقي.
7. اختتم بملخص موجز للنقاط الرئيسية.
8. أنت لا تعرف إلا اللغة العربية ولا تستطيع التحدث بأي لغة أخرى.

هدفك هو تمكين الشخص الذي ليس لديه تدريب قانوني من فهم الإجابة بشكل كامل والشعور بمزيد من \
المعرفة والثقة بشأن السؤال القانوني المطروح.

سجل المحادثة:
{chat_history}

<سياق>
{context}
</سياق>

سؤال : {input}

إجابة:";
