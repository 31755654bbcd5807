//! Grounding prompt assembly.

use crate::pubmed::Article;

/// Builds the grounding prompt for one question. Pure and deterministic:
/// identical inputs always produce byte-identical output.
///
/// Articles are numbered 1-based in the order given; that number, not the
/// PMID, is the citation index the model is told to use via `[ref:N]`.
pub fn build_prompt(question: &str, articles: &[Article]) -> String {
    let mut context = String::new();
    for (index, article) in articles.iter().enumerate() {
        context.push_str(&format!(
            "[{}] PMID: {}\nTitle: {}\nAbstract: {}\n\n",
            index + 1,
            article.pmid,
            article.title,
            article.abstract_text
        ));
    }

    format!(
        "用户问题：{}\n\n\
         以下是相关的 PubMed 文献摘要：\n\n\
         {}\
         请你基于以上文献，用严谨的学术语气回答用户问题。\n\
         在回答中引用文献时请使用 [ref:数字] 标注引用。\n\
         以中文输出结果。\n",
        question, context
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(pmid: &str, title: &str, abstract_text: &str) -> Article {
        Article {
            pmid: pmid.to_string(),
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            authors: Vec::new(),
        }
    }

    #[test]
    fn identical_inputs_produce_byte_identical_output() {
        let articles = vec![
            article("111", "Title A", "Abstract A"),
            article("222", "Title B", "Abstract B"),
        ];

        let first = build_prompt("糖尿病的治疗方法", &articles);
        let second = build_prompt("糖尿病的治疗方法", &articles);

        assert_eq!(first, second);
    }

    #[test]
    fn blocks_are_numbered_sequentially_regardless_of_pmid() {
        let articles = vec![
            article("99887766", "First", ""),
            article("5", "Second", ""),
        ];

        let prompt = build_prompt("q", &articles);

        assert!(prompt.contains("[1] PMID: 99887766"));
        assert!(prompt.contains("[2] PMID: 5"));
        assert!(prompt.contains("[ref:数字]"));
    }

    #[test]
    fn empty_article_list_still_yields_instructions() {
        let prompt = build_prompt("q", &[]);

        assert!(prompt.contains("用户问题：q"));
        assert!(prompt.contains("以中文输出结果"));
        assert!(!prompt.contains("[1]"));
    }
}
