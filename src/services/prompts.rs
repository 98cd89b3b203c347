//! Instructions sent to the document-understanding service.

use crate::domain::analysis::Category;

const GOODS_INSTRUCTION: &str = r#"Ты эксперт по анализу накладных, товарных чеков и счетов-фактур.
Проанализируй документ и извлеки из него информацию о товарах.

Верни ТОЛЬКО JSON без пояснений в следующем формате:
{
  "document_type": "тип документа (накладная, товарный чек, счет-фактура)",
  "document_number": "номер документа или null",
  "date": "дата документа в формате YYYY-MM-DD или null",
  "supplier": "поставщик (продавец) или null",
  "customer": "покупатель или null",
  "items": [
    {
      "name": "название товара",
      "quantity": 1.0,
      "unit": "единица измерения (шт, кг, м, л, мешок) или null",
      "price": 0.0,
      "total": 0.0
    }
  ],
  "total_amount": 0.0,
  "currency": "валюта (UAH, USD, EUR) или null",
  "confidence": 0.0
}

Правила:
- перечисляй позиции в том порядке, в котором они идут в документе;
- числа записывай без пробелов и символов валюты, дробную часть отделяй точкой;
- если цена или сумма позиции не указана, вычисли её из количества;
- confidence от 0 до 1 отражает уверенность распознавания."#;

const JOBS_INSTRUCTION: &str = r#"Ты эксперт по анализу актов выполненных работ и счетов на услуги.
Проанализируй документ и извлеки из него информацию о выполненных работах и услугах.

Верни ТОЛЬКО JSON без пояснений в следующем формате:
{
  "document_type": "тип документа (акт выполненных работ, счет, договор)",
  "document_number": "номер документа или null",
  "date": "дата документа в формате YYYY-MM-DD или null",
  "supplier": "исполнитель работ или null",
  "customer": "заказчик или null",
  "items": [
    {
      "name": "название работы или услуги",
      "quantity": 1.0,
      "unit": "единица измерения (шт, м2, м3, час, услуга) или null",
      "price": 0.0,
      "total": 0.0
    }
  ],
  "total_amount": 0.0,
  "currency": "валюта (UAH, USD, EUR) или null",
  "confidence": 0.0
}

Правила:
- перечисляй работы в том порядке, в котором они идут в документе;
- материалы, указанные в акте отдельными строками, тоже включай в items;
- числа записывай без пробелов и символов валюты, дробную часть отделяй точкой;
- confidence от 0 до 1 отражает уверенность распознавания."#;

/// Instruction paired with the uploaded file for `category`.
pub fn analysis_instruction(category: Category) -> &'static str {
    match category {
        Category::Materials => GOODS_INSTRUCTION,
        Category::Jobs => JOBS_INSTRUCTION,
    }
}
