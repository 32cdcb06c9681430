//! Table structure (WCAG 1.3.1).

use async_trait::async_trait;

use lumen_core::{EvaluatorId, EvaluatorResult, Finding, Summary, SummaryKind, TableFinding};

use super::{unavailable, AuditContext, Evaluator, EvaluatorError};
use crate::dom::{DomError, ElementHandle, Page, QuerySpec};

pub struct TableEvaluator;

async fn inspect(page: &dyn Page, table: &ElementHandle) -> Result<TableFinding, DomError> {
    let headers = page.find_within(table, &QuerySpec::Tag("th")).await?.len();
    let rows = page.find_within(table, &QuerySpec::Tag("tr")).await?.len();
    let compliant = headers > 0 && rows > 0;

    let message = if compliant {
        "table has header cells and rows"
    } else if headers == 0 {
        "table has no header cells"
    } else {
        "table has no rows"
    };

    Ok(TableFinding {
        headers,
        rows,
        compliant,
        message: message.to_string(),
    })
}

#[async_trait]
impl Evaluator for TableEvaluator {
    fn id(&self) -> EvaluatorId {
        EvaluatorId::TableStructure
    }

    async fn run(&self, ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError> {
        let page = ctx.page.as_ref();
        let tables = page.find_all(&QuerySpec::Tag("table")).await?;

        let mut results = Vec::with_capacity(tables.len());
        let mut compliant = 0;
        for (i, table) in tables.iter().enumerate() {
            match inspect(page, table).await {
                Ok(finding) => {
                    if finding.compliant {
                        compliant += 1;
                    }
                    results.push(Finding::Table(finding));
                }
                Err(e) => results.push(unavailable(i + 1, Some("table".to_string()), &e)),
            }
        }

        let summary = Summary::new(SummaryKind::Tables, tables.len(), compliant);
        Ok(EvaluatorResult::new(self.id(), results).with_summary(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fake::{FakeDocument, FakeElement};
    use crate::evaluators::testing::context;

    #[tokio::test]
    async fn test_header_and_layout_tables() {
        let mut doc = FakeDocument::new();
        let data = doc.add(FakeElement::new("table"));
        let head = doc.add_child(data, FakeElement::new("tr"));
        doc.add_child(head, FakeElement::new("th").text("Name"));
        let body = doc.add_child(data, FakeElement::new("tr"));
        doc.add_child(body, FakeElement::new("td").text("Ada"));

        let layout = doc.add(FakeElement::new("table"));
        let row = doc.add_child(layout, FakeElement::new("tr"));
        doc.add_child(row, FakeElement::new("td"));

        let ctx = context(doc).await;
        let result = TableEvaluator.run(&ctx).await.unwrap();

        assert!(matches!(&result.results[0], Finding::Table(t) if t.headers == 1 && t.rows == 2 && t.compliant));
        assert!(matches!(&result.results[1], Finding::Table(t) if !t.compliant && t.message == "table has no header cells"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["summary"]["total_tables"], 2);
        assert_eq!(json["summary"]["compliant_percentage"], 50.0);
    }
}
