//! Восстановление пословных меток времени из посимвольных.
//!
//! Это единственное место, которое интерпретирует посимвольную разметку
//! синтезатора. О границах реплик модуль ничего не знает: срез нужного
//! диапазона делает [`word_timings_for_range`].

use crate::models::WordTiming;

use super::CharacterAlignment;

/// Является ли символ CJK-символом, который сам по себе образует слово
pub fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF     // CJK Unified Ideographs
        | 0x3400..=0x4DBF   // CJK Unified Ideographs Extension A
        | 0x3000..=0x303F   // CJK Symbols and Punctuation
        | 0x3040..=0x309F   // Hiragana
        | 0x30A0..=0x30FF   // Katakana
        | 0xFF00..=0xFFEF   // Halfwidth and Fullwidth Forms
        | 0xAC00..=0xD7AF   // Hangul Syllables
    )
}

fn is_word_break(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Накопитель текущего слова
struct WordAccumulator<'a> {
    starts: &'a [f64],
    ends: &'a [f64],
    text: String,
    first: Option<usize>,
    last: usize,
    words: Vec<WordTiming>,
}

impl<'a> WordAccumulator<'a> {
    fn new(starts: &'a [f64], ends: &'a [f64]) -> Self {
        Self {
            starts,
            ends,
            text: String::new(),
            first: None,
            last: 0,
            words: Vec::new(),
        }
    }

    fn push(&mut self, index: usize, fragment: &str) {
        if self.first.is_none() {
            self.first = Some(index);
        }
        self.last = index;
        self.text.push_str(fragment);
    }

    fn flush(&mut self) {
        if let Some(first) = self.first.take() {
            let text = std::mem::take(&mut self.text);
            self.emit(text.trim(), first, self.last);
        }
        self.text.clear();
    }

    fn emit(&mut self, word: &str, first: usize, last: usize) {
        // Скобки могли попасть в слово только из непарного `]`
        if word.is_empty() || word.contains('[') || word.contains(']') {
            return;
        }
        self.words.push(WordTiming {
            word: word.to_string(),
            start: self.starts[first],
            end: self.ends[last],
        });
    }

    fn finish(mut self) -> Vec<WordTiming> {
        self.flush();
        self.words
    }
}

/// Пословная разметка по трём параллельным массивам.
///
/// Один проход слева направо:
/// - `[` завершает текущее слово и открывает маркер тона/эмоции, всё до `]`
///   отбрасывается;
/// - CJK-символ завершает текущее слово и сам становится словом;
/// - пробел, табуляция и перевод строки завершают слово;
/// - остальные символы дописываются в текущее слово.
///
/// Начало слова берётся у первого символа, конец у последнего. Если массивы
/// разной длины, обрабатывается общий префикс.
pub fn extract_word_timings<S: AsRef<str>>(
    characters: &[S],
    starts: &[f64],
    ends: &[f64],
) -> Vec<WordTiming> {
    let len = characters.len().min(starts.len()).min(ends.len());
    let mut acc = WordAccumulator::new(&starts[..len], &ends[..len]);
    let mut in_marker = false;

    for (index, fragment) in characters[..len].iter().enumerate() {
        let fragment = fragment.as_ref();
        let Some(c) = fragment.chars().next() else {
            continue;
        };

        if in_marker {
            if c == ']' {
                in_marker = false;
            }
            continue;
        }

        if c == '[' {
            acc.flush();
            in_marker = true;
        } else if is_cjk(c) {
            acc.flush();
            acc.emit(fragment.trim(), index, index);
        } else if is_word_break(c) {
            acc.flush();
        } else {
            acc.push(index, fragment);
        }
    }

    acc.finish()
}

/// Пословная разметка для диапазона `[start, end)` глобальной разметки.
///
/// Индексы приходят от синтезатора и могут выходить за границы массивов,
/// поэтому диапазон обрезается; пустой или перевёрнутый диапазон даёт
/// пустой список.
pub fn word_timings_for_range(
    alignment: &CharacterAlignment,
    start: usize,
    end: usize,
) -> Vec<WordTiming> {
    let len = alignment.len();
    let end = end.min(len);
    let start = start.min(end);

    extract_word_timings(
        &alignment.characters[start..end],
        &alignment.character_start_times_seconds[start..end],
        &alignment.character_end_times_seconds[start..end],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Разметка, где каждый символ длится 0.1 с
    fn timed(text: &str) -> (Vec<String>, Vec<f64>, Vec<f64>) {
        let chars: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        let starts = (0..chars.len()).map(|i| i as f64 * 0.1).collect();
        let ends = (0..chars.len()).map(|i| (i + 1) as f64 * 0.1).collect();
        (chars, starts, ends)
    }

    fn words(text: &str) -> Vec<String> {
        let (chars, starts, ends) = timed(text);
        extract_word_timings(&chars, &starts, &ends)
            .into_iter()
            .map(|w| w.word)
            .collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_whitespace_delimited_words_span_their_characters() {
        let (chars, starts, ends) = timed("Hello  big\tworld\n");
        let result = extract_word_timings(&chars, &starts, &ends);

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].word, "Hello");
        assert!(approx(result[0].start, 0.0));
        assert!(approx(result[0].end, 0.5));
        assert_eq!(result[1].word, "big");
        assert!(approx(result[1].start, 0.7));
        assert!(approx(result[1].end, 1.0));
        assert_eq!(result[2].word, "world");
        assert!(approx(result[2].start, 1.1));
        assert!(approx(result[2].end, 1.6));
    }

    #[test]
    fn test_cjk_characters_are_separate_words() {
        assert_eq!(words("Hi你好"), vec!["Hi", "你", "好"]);
        assert_eq!(words("こんにちは"), vec!["こ", "ん", "に", "ち", "は"]);
        assert_eq!(words("안녕 ok"), vec!["안", "녕", "ok"]);
    }

    #[test]
    fn test_cjk_word_keeps_own_timing() {
        let (chars, starts, ends) = timed("a你");
        let result = extract_word_timings(&chars, &starts, &ends);
        assert_eq!(result[1].word, "你");
        assert!(approx(result[1].start, 0.1));
        assert!(approx(result[1].end, 0.2));
    }

    #[test]
    fn test_markers_are_dropped() {
        assert_eq!(words("[cheerfully] Hello"), vec!["Hello"]);
        assert_eq!(words("[cheerfully, happy] Hello there"), vec!["Hello", "there"]);
        assert_eq!(words("Hel[whisper]lo"), vec!["Hel", "lo"]);
        assert_eq!(words("[笑] 你好"), vec!["你", "好"]);
        assert!(words("[sighs]").is_empty());
    }

    #[test]
    fn test_marker_does_not_consume_timing() {
        let (chars, starts, ends) = timed("[sad] Yes");
        let result = extract_word_timings(&chars, &starts, &ends);
        assert_eq!(result.len(), 1);
        assert!(approx(result[0].start, 0.6));
        assert!(approx(result[0].end, 0.9));
    }

    #[test]
    fn test_stray_closing_bracket_word_is_dropped() {
        assert_eq!(words("ok] fine"), vec!["fine"]);
    }

    #[test]
    fn test_fullwidth_punctuation_is_its_own_word() {
        assert_eq!(words("好。"), vec!["好", "。"]);
    }

    #[test]
    fn test_mismatched_lengths_use_common_prefix() {
        let (chars, starts, mut ends) = timed("one two");
        ends.truncate(3);
        let result = extract_word_timings(&chars, &starts, &ends);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].word, "one");
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let (chars, starts, ends) = timed("[calm] Hi 你好 there");
        let first = extract_word_timings(&chars, &starts, &ends);
        let second = extract_word_timings(&chars, &starts, &ends);
        assert_eq!(first, second);
    }

    #[test]
    fn test_range_slicing_clamps_indices() {
        let (characters, starts, ends) = timed("Hi there. Bye now.");
        let alignment = CharacterAlignment {
            characters,
            character_start_times_seconds: starts,
            character_end_times_seconds: ends,
        };

        let first: Vec<String> = word_timings_for_range(&alignment, 0, 9)
            .into_iter()
            .map(|w| w.word)
            .collect();
        assert_eq!(first, vec!["Hi", "there."]);

        let second = word_timings_for_range(&alignment, 10, 500);
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].word, "Bye");
        assert!(approx(second[0].start, 1.0));

        assert!(word_timings_for_range(&alignment, 9, 3).is_empty());
        assert!(word_timings_for_range(&alignment, 400, 500).is_empty());
    }
}
