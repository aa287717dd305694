//! 语义邮件索引边界
//!
//! 向量索引由外部维护（每日 autoindex），核心只依赖 SemanticIndex：
//! 查询文本 + 元数据过滤 → 按相似度排序的候选列表。InMemoryEmailIndex 是
//! 词重叠打分的本地实现，供演示与测试使用；生产环境由真正的向量索引实现该 trait。

use chrono::{DateTime, Utc};

/// 索引查询：语义文本 + 可选过滤条件
#[derive(Debug, Clone, Default)]
pub struct IndexQuery {
    pub text: String,
    /// 发件人子串过滤（索引层不支持 contains 时由实现后置过滤）
    pub sender: Option<String>,
    /// 仅保留该时刻之后的邮件
    pub after: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// 检索候选：邮件元数据 + 相似度分
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: Option<DateTime<Utc>>,
    pub snippet: String,
    /// [0,1]，越大越相关
    pub score: f64,
}

/// 语义索引能力接口
pub trait SemanticIndex: Send + Sync {
    fn search(&self, query: &IndexQuery) -> Vec<ScoredCandidate>;
}

/// 已索引邮件（本地实现的存储单元）
#[derive(Debug, Clone)]
pub struct IndexedEmail {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: Option<DateTime<Utc>>,
    pub body: String,
}

/// 内存索引：小写分词 + 查询词命中率打分
#[derive(Default)]
pub struct InMemoryEmailIndex {
    docs: Vec<IndexedEmail>,
}

impl InMemoryEmailIndex {
    pub fn new(docs: Vec<IndexedEmail>) -> Self {
        Self { docs }
    }

    fn score(query: &str, doc: &IndexedEmail) -> f64 {
        let haystack = format!("{} {}", doc.subject, doc.body).to_lowercase();
        let terms: Vec<&str> = query
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .collect();
        if terms.is_empty() {
            return 0.0;
        }
        let hits = terms
            .iter()
            .filter(|t| haystack.contains(&t.to_lowercase()))
            .count();
        hits as f64 / terms.len() as f64
    }
}

impl SemanticIndex for InMemoryEmailIndex {
    fn search(&self, query: &IndexQuery) -> Vec<ScoredCandidate> {
        let limit = if query.limit == 0 { 10 } else { query.limit };
        let mut hits: Vec<ScoredCandidate> = self
            .docs
            .iter()
            .filter(|d| match (&query.sender, &d.sender) {
                (Some(wanted), actual) => {
                    actual.to_lowercase().contains(&wanted.to_lowercase())
                }
                (None, _) => true,
            })
            .filter(|d| match (query.after, d.date) {
                (Some(after), Some(date)) => date >= after,
                // 缺失日期的文档在有时间过滤时保留（与原索引行为一致：解析失败不剔除）
                _ => true,
            })
            .map(|d| ScoredCandidate {
                id: d.id.clone(),
                subject: d.subject.clone(),
                sender: d.sender.clone(),
                date: d.date,
                snippet: d.body.chars().take(200).collect(),
                score: Self::score(&query.text, d),
            })
            .filter(|c| c.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> InMemoryEmailIndex {
        InMemoryEmailIndex::new(vec![
            IndexedEmail {
                id: "e1".into(),
                subject: "Placement drive schedule".into(),
                sender: "stu.poc@example.edu".into(),
                date: Some(Utc::now() - Duration::days(1)),
                body: "The placement drive for final year students starts Monday.".into(),
            },
            IndexedEmail {
                id: "e2".into(),
                subject: "Library notice".into(),
                sender: "library@example.edu".into(),
                date: Some(Utc::now() - Duration::days(30)),
                body: "Return overdue books before Friday.".into(),
            },
        ])
    }

    #[test]
    fn test_search_ranks_relevant_first() {
        let index = sample();
        let hits = index.search(&IndexQuery {
            text: "placement drive".into(),
            limit: 5,
            ..Default::default()
        });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "e1");
        assert!(hits[0].score > 0.9);
    }

    #[test]
    fn test_sender_and_date_filters() {
        let index = sample();
        let hits = index.search(&IndexQuery {
            text: "notice books".into(),
            sender: Some("library".into()),
            after: Some(Utc::now() - Duration::days(60)),
            limit: 5,
            ..Default::default()
        });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "e2");

        // 时间窗口收紧后过滤掉旧邮件
        let hits = index.search(&IndexQuery {
            text: "notice books".into(),
            after: Some(Utc::now() - Duration::days(7)),
            limit: 5,
            ..Default::default()
        });
        assert!(hits.is_empty());
    }
}
